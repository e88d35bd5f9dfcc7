#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum AuthMethod {
    #[display("Basic")]
    Basic,
    #[display("Digest")]
    Digest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vendor {
    Hikvision { raw_tcp: bool },
    Dahua { channel: Option<String>, events: Vec<String> },
    Amcrest,
}

/// A configured camera. Built once from settings and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub vendor: Vendor,
}

impl Vendor {
    pub fn family(&self) -> &'static str {
        match self {
            Vendor::Hikvision { .. } => "hikvision",
            Vendor::Dahua { .. } => "dahua",
            Vendor::Amcrest => "amcrest",
        }
    }
}

impl Device {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
