#![no_main]
use helios::modbus::{RegisterType, decode_power};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Big-endian register pairs, trailing odd byte ignored
    let regs: Vec<u16> = data
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .collect();

    for data_type in [
        RegisterType::U16,
        RegisterType::S16,
        RegisterType::U32,
        RegisterType::S32,
        RegisterType::F32,
    ] {
        if let Ok(Some(watts)) = decode_power(&regs, data_type) {
            assert!(watts.is_finite());
        }
    }
    let _ = helios::modbus::decode_32bit_float(&regs);
});
