#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingSystem {
    Unknown,
    Windows,
    Linux,
    MacOS,
    IOS,
    Android,
}

impl OperatingSystem {
    pub fn is_desktop(&self) -> bool {
        matches!(
            self,
            OperatingSystem::Windows | OperatingSystem::Linux | OperatingSystem::MacOS
        )
    }

    pub fn is_not_desktop(&self) -> bool {
        !self.is_desktop()
    }
}

impl From<&str> for OperatingSystem {
    fn from(s: &str) -> Self {
        match s {
            "windows" => OperatingSystem::Windows,
            "linux" => OperatingSystem::Linux,
            "macos" => OperatingSystem::MacOS,
            "ios" => OperatingSystem::IOS,
            "android" => OperatingSystem::Android,
            _ => OperatingSystem::Unknown,
        }
    }
}

pub fn get_operating_system() -> OperatingSystem {
    OperatingSystem::from(std::env::consts::OS)
}
