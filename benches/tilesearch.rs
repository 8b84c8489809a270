use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use tilesearch::{
    calibrate, search_image, Access, ComputeBackend, CpuBackend, DeviceSelector, Generator,
    HarnessConfig, Image, KernelSet, KernelSource, RandomPlacement, Search, TileGrid,
};

fn bench_search(c: &mut Criterion) {
    let grid = TileGrid::new(1024, 1024, 16, 16).unwrap();
    let mut image = Image::new(1024, 1024).unwrap();
    image.generate(&mut RandomPlacement::seeded(11)).unwrap();

    c.bench_function("host_search_1024_chip16", |b| {
        b.iter(|| black_box(search_image(image.view(), &grid).unwrap()));
    });

    let mut backend = CpuBackend::open(&DeviceSelector::default()).unwrap();
    let generator =
        Generator::build(&mut backend, &KernelSource::builtin_generator(), 1024, 1024).unwrap();
    let search = Search::build(&mut backend, &KernelSource::builtin_search(), grid).unwrap();
    let mut buffer = backend.alloc(grid.image_len(), Access::ReadWrite).unwrap();
    let output = backend.alloc(grid.tile_count(), Access::WriteOnly).unwrap();
    let mut placement = RandomPlacement::seeded(12);

    c.bench_function("cpu_device_generate_and_search_1024_chip16", |b| {
        b.iter(|| {
            generator
                .enqueue(&mut backend, &mut buffer, &mut placement)
                .unwrap();
            let event = search.enqueue(&mut backend, &buffer, &output).unwrap();
            backend.wait(&event).unwrap();
        });
    });
}

fn bench_calibrate(c: &mut Criterion) {
    let grid = TileGrid::new(256, 256, 8, 8).unwrap();
    let config = HarnessConfig::new(grid)
        .with_iterations(20)
        .with_kernels(KernelSet::Builtin);
    let mut placement = RandomPlacement::seeded(13);

    c.bench_function("calibrate_256_chip8_x20", |b| {
        b.iter(|| black_box(calibrate::<CpuBackend, _>(&config, &mut placement).unwrap()));
    });
}

criterion_group!(benches, bench_search, bench_calibrate);
criterion_main!(benches);
