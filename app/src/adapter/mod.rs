pub mod amcrest;
pub mod dahua;
pub mod ftp;
pub mod hikvision;
pub mod hisilicon;
pub mod http;

pub use reader::{EventDialect, StreamReader};

mod reader {
    use super::amcrest::AmcrestDialect;
    use super::dahua::DahuaDialect;
    use super::hikvision::{self, HikvisionDialect};
    use super::http::{DeviceConnection, multipart};
    use crate::core::{Device, EventSender, RawEvent, StreamError, Vendor};

    /// Vendor specifics of a multipart event stream.
    pub trait EventDialect {
        fn stream_path(&self) -> String;

        fn requires_mixed(&self) -> bool {
            false
        }

        /// `Ok(None)` for frames that carry no event, like heartbeats.
        fn parse(&self, body: &str) -> anyhow::Result<Option<RawEvent>>;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StreamReader {
        HikvisionHttp,
        HikvisionRawTcp,
        Dahua(DahuaDialect),
        Amcrest,
    }

    impl StreamReader {
        pub fn for_device(device: &Device) -> Self {
            match &device.vendor {
                Vendor::Hikvision { raw_tcp: false } => StreamReader::HikvisionHttp,
                Vendor::Hikvision { raw_tcp: true } => StreamReader::HikvisionRawTcp,
                Vendor::Dahua { channel, events } => StreamReader::Dahua(DahuaDialect::new(channel.clone(), events.clone())),
                Vendor::Amcrest => StreamReader::Amcrest,
            }
        }

        /// Endpoint used to negotiate authentication, `None` to go straight to Basic.
        pub fn probe_path(&self) -> Option<&'static str> {
            match self {
                StreamReader::HikvisionHttp | StreamReader::HikvisionRawTcp => Some(hikvision::PROBE_PATH),
                StreamReader::Dahua(_) => Some(super::dahua::PROBE_PATH),
                StreamReader::Amcrest => None,
            }
        }

        /// Runs one session. `Ok(())` means the camera closed the stream cleanly.
        pub async fn read_events(&self, conn: &mut DeviceConnection, events: &EventSender) -> Result<(), StreamError> {
            match self {
                StreamReader::HikvisionHttp => multipart::read_events(conn, &HikvisionDialect, events).await,
                StreamReader::HikvisionRawTcp => hikvision::raw_tcp::read_events(conn.device(), events).await,
                StreamReader::Dahua(dialect) => multipart::read_events(conn, dialect, events).await,
                StreamReader::Amcrest => multipart::read_events(conn, &AmcrestDialect, events).await,
            }
        }
    }

}
