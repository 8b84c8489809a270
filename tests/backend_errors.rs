use tilesearch::{
    ComputeBackend, CpuBackend, DeviceKind, DeviceSelector, ErrorKind, HarnessConfig, KernelPaths,
    KernelSet, KernelSource, RandomPlacement, TileGrid, TileSearchError,
};

#[test]
fn missing_device_class_is_environment_error() {
    let err = CpuBackend::open(&DeviceSelector::kind(DeviceKind::Accelerator)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Environment);
    assert!(matches!(err, TileSearchError::NoDeviceFound { .. }));
}

#[test]
fn cpu_selector_opens_host_device() {
    let backend = CpuBackend::open(&DeviceSelector {
        kind: DeviceKind::Cpu,
        index: Some(0),
        threads: Some(3),
    })
    .unwrap();
    assert_eq!(backend.device().kind, DeviceKind::Cpu);
    assert_eq!(backend.device().compute_units, 3);
}

#[test]
fn compile_error_carries_log() {
    let mut backend = CpuBackend::open(&DeviceSelector::default()).unwrap();
    let source = KernelSource::new(
        "broken.cl",
        "__kernel void find_image(__global const uint *image, const uint w)\n{ }\n",
    );
    let err = backend.build_kernel(&source, "find_image").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
    let text = err.to_string();
    assert!(text.starts_with("error in kernel find_image:"), "{text}");
    assert!(text.contains("broken.cl"), "{text}");
}

#[test]
fn missing_kernel_directory_fails_setup() {
    let grid = TileGrid::new(8, 8, 4, 4).unwrap();
    let config = HarnessConfig::new(grid)
        .with_iterations(1)
        .with_kernels(KernelSet::Files(KernelPaths::in_dir("no/such/kernels")));
    let err = tilesearch::calibrate::<CpuBackend, _>(&config, &mut RandomPlacement::seeded(0))
        .unwrap_err();
    assert!(matches!(err, TileSearchError::KernelSourceIo { .. }));
    assert_eq!(err.kind(), ErrorKind::Environment);
}

#[test]
fn shipped_kernel_files_build() {
    let paths = KernelPaths::in_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels"));
    let mut backend = CpuBackend::open(&DeviceSelector::default()).unwrap();
    backend
        .build_kernel(&paths.load_generator().unwrap(), "generate_image")
        .unwrap();
    backend
        .build_kernel(&paths.load_search().unwrap(), "find_image")
        .unwrap();
}
