use criterion::{Criterion, criterion_group, criterion_main};

use rohc_comp_codec::{
    crc::{CRC_INIT_8, CrcKind, CrcTables, crc_calculate},
    wlsb::{ShiftParam, Wlsb},
};

fn criterion_benchmark(c: &mut Criterion) {
    let tables = CrcTables::default();
    let headers = [0x45u8; 48];

    c.bench_function("crc8_over_headers", |b| {
        b.iter(|| crc_calculate(CrcKind::Crc8, &headers, CRC_INIT_8, &tables))
    });

    let mut window = Wlsb::new(4, ShiftParam::Sn);
    for sn in 0..4u16 {
        window.add(sn, 1000 + sn);
    }

    c.bench_function("wlsb_k", |b| b.iter(|| window.k(1004)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
