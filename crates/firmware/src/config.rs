/// Where the host build finds its firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareConfig {
    /// Environment variable naming the firmware file.
    pub env_var: String,
    /// ELF section holding the embedded data extension.
    pub section: String,
    /// Address assumed for files that are not ELF.
    pub raw_base: usize,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            env_var: "VM_FIRMWARE_IMAGE".to_string(),
            section: ".embedded_data".to_string(),
            raw_base: 0,
        }
    }
}
