#[path = "common/firmware.rs"]
mod firmware_helpers;

use firmware::{FirmwareConfig, FirmwareError, FirmwareInfoProvider, HostFirmware, StaticFirmware};
use firmware_helpers::*;

#[test]
fn test_default_config() {
    let config = FirmwareConfig::default();
    assert_eq!(config.env_var, "VM_FIRMWARE_IMAGE");
    assert_eq!(config.section, ".embedded_data");
    assert_eq!(config.raw_base, 0);
}

#[test]
fn test_static_firmware() {
    let bytes: &'static [u8] = Vec::leak(extension_bytes(FIRMWARE_BASE, &[&[3; 16]], b"boot"));
    let firmware = StaticFirmware::at(bytes, FIRMWARE_BASE);
    let extension = firmware.extension().unwrap();
    assert_eq!(extension.images(), 1);
    assert_eq!(extension.config(), b"boot");

    // Mapped where it was linked: addresses are the slice's own.
    let mapped = StaticFirmware::new(bytes);
    assert_eq!(mapped.address(), bytes.as_ptr() as usize);
    assert!(mapped.extension().is_some());
}

#[test]
fn test_host_firmware_raw_file() {
    let config = FirmwareConfig {
        raw_base: FIRMWARE_BASE,
        ..FirmwareConfig::default()
    };
    let firmware = HostFirmware::from_bytes(extension_bytes(FIRMWARE_BASE, &[], b"raw"), &config).unwrap();
    assert_eq!(firmware.address(), FIRMWARE_BASE);
    assert_eq!(firmware.extension().unwrap().config(), b"raw");
}

#[test]
fn test_host_firmware_elf_section() {
    init_logger();
    let address = 0x0800_4000;
    let section = extension_bytes(address, &[&[5; 24]], b"elf");
    let elf = elf_with_section(".embedded_data", address as u64, &section);

    let firmware = HostFirmware::from_bytes(elf, &FirmwareConfig::default()).unwrap();
    assert_eq!(firmware.address(), address);
    assert_eq!(firmware.data(), &section[..]);
    let extension = firmware.extension().unwrap();
    assert_eq!(extension.image_bytes(0), Some(&[5; 24][..]));
    assert_eq!(extension.config(), b"elf");
}

#[test]
fn test_host_firmware_missing_section() {
    let elf = elf_with_section(".rodata", 0x1000, &[0; 64]);
    let result = HostFirmware::from_bytes(elf, &FirmwareConfig::default());
    assert!(matches!(result, Err(FirmwareError::MissingSection(name)) if name == ".embedded_data"));
}

#[test]
fn test_host_firmware_from_env() {
    let path = std::env::temp_dir().join(format!("vm-firmware-{}.bin", std::process::id()));
    std::fs::write(&path, extension_bytes(0, &[], b"env")).unwrap();
    let config = FirmwareConfig {
        env_var: "VM_FIRMWARE_IMAGE_PROVIDER_TEST".to_string(),
        ..FirmwareConfig::default()
    };
    std::env::set_var(&config.env_var, &path);

    let firmware = HostFirmware::from_env(&config).unwrap().unwrap();
    assert_eq!(firmware.extension().unwrap().config(), b"env");
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_host_firmware_without_env() {
    let config = FirmwareConfig {
        env_var: "VM_FIRMWARE_IMAGE_UNSET_TEST".to_string(),
        ..FirmwareConfig::default()
    };
    assert!(HostFirmware::from_env(&config).unwrap().is_none());
}

#[test]
fn test_host_firmware_missing_file() {
    let result = HostFirmware::from_path("/nonexistent/firmware.elf", &FirmwareConfig::default());
    assert!(matches!(result, Err(FirmwareError::Io(_))));
}
