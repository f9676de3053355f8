/// Controls registry construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Id assigned to the first registered family; later ones count up.
    pub first_family_id: u16,
    /// Maximum number of declarations loaded from a directory.
    pub max_families_from_directory: usize,
    /// Maximum bytes allowed per declaration file loaded from a directory.
    pub max_family_file_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            first_family_id: 0x11,
            max_families_from_directory: 64,
            max_family_file_size: 64 * 1024,
        }
    }
}
