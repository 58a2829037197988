// config.rs

use std::fmt;

use anyhow::bail;
use askama::Template;
use crc::{Crc, CRC_32_ISCSI};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use crate::{CharDisplay, DisplayScheduler};

pub const NVS_BUF_SIZE: usize = 1024;
pub const CONFIG_NOTICE_HOLD: Duration = Duration::from_secs(2);

#[cfg(target_os = "espidf")]
const CONFIG_NAME: &str = "cfg";
const CRC_LEN: usize = 4;

static CONFIG_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Template)]
#[template(path = "index.html.ask", escape = "html")]
pub struct MyConfig {
    // stored keys missing from the blob read as empty, not as build defaults
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub text: String,
}

impl Default for MyConfig {
    fn default() -> Self {
        Self {
            ssid: option_env!("WIFI_SSID").unwrap_or_default().into(),
            pass: option_env!("WIFI_PASS").unwrap_or_default().into(),
            api_key: option_env!("API_KEY").unwrap_or_default().into(),
            channel_id: option_env!("CHANNEL_ID").unwrap_or_default().into(),
            text: option_env!("DISPLAY_TEXT").unwrap_or_default().into(),
        }
    }
}

// secrets are logged by length only
impl fmt::Debug for MyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MyConfig")
            .field("ssid", &self.ssid)
            .field("pass", &format_args!("<{} chars>", self.pass.chars().count()))
            .field("api_key", &format_args!("<{} chars>", self.api_key.chars().count()))
            .field("channel_id", &self.channel_id)
            .field("text", &self.text)
            .finish()
    }
}

impl MyConfig {
    pub fn to_blob(&self) -> anyhow::Result<Vec<u8>> {
        let mut blob = serde_json::to_vec(self)?;
        let crc = CONFIG_CRC.checksum(&blob);
        blob.extend_from_slice(&crc.to_le_bytes());
        if blob.len() > NVS_BUF_SIZE {
            bail!(
                "Encoded config is {sz} bytes, max is {NVS_BUF_SIZE}",
                sz = blob.len()
            );
        }
        Ok(blob)
    }

    pub fn from_blob(blob: &[u8]) -> anyhow::Result<Self> {
        if blob.len() < CRC_LEN {
            bail!("Config blob too short ({} bytes)", blob.len());
        }
        let (json, crc_bytes) = blob.split_at(blob.len() - CRC_LEN);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = CONFIG_CRC.checksum(json);
        if stored != computed {
            bail!("Config checksum mismatch: stored {stored:#010x}, computed {computed:#010x}");
        }
        Ok(serde_json::from_slice(json)?)
    }
}

/// Persistent home of [`MyConfig`].
///
/// `Ok(None)` from `load` means nothing was ever stored, an `Err` means the
/// storage could not be read or held a corrupt record.
pub trait ConfigStorage: Send + Sync {
    fn load(&mut self) -> anyhow::Result<Option<MyConfig>>;
    fn save(&mut self, config: &MyConfig) -> anyhow::Result<()>;
}

pub async fn load_config<D: CharDisplay>(
    store: &mut dyn ConfigStorage,
    display: &mut DisplayScheduler<D>,
) -> MyConfig {
    match store.load() {
        Ok(Some(c)) => c,
        Ok(None) => {
            info!("No stored config, using defaults");
            let c = MyConfig::default();
            match store.save(&c) {
                Ok(()) => info!("Successfully saved default config."),
                Err(e) => error!("Cannot save default config: {e:#}"),
            }
            c
        }
        Err(e) => {
            // keep the bad record around, the portal will overwrite it
            error!("Stored config is unusable: {e:#}");
            if let Err(e) = display.show_status("Config error", "using defaults") {
                error!("Display error: {e:#}");
            }
            sleep(CONFIG_NOTICE_HOLD).await;
            MyConfig::default()
        }
    }
}

#[cfg(target_os = "espidf")]
pub struct NvsConfigStore {
    nvs: esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault>,
}

#[cfg(target_os = "espidf")]
impl NvsConfigStore {
    pub fn new(nvs: esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault>) -> Self {
        Self { nvs }
    }
}

#[cfg(target_os = "espidf")]
impl ConfigStorage for NvsConfigStore {
    fn load(&mut self) -> anyhow::Result<Option<MyConfig>> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
        let b = match self.nvs.get_raw(CONFIG_NAME, &mut nvsbuf) {
            Err(e) => bail!("Nvs read error {e:?}"),
            Ok(Some(b)) => b,
            Ok(None) => {
                info!("Nvs key not found");
                return Ok(None);
            }
        };
        info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());

        let c = MyConfig::from_blob(b)?;
        info!("Successfully parsed config from nvs.");
        Ok(Some(c))
    }

    fn save(&mut self, config: &MyConfig) -> anyhow::Result<()> {
        let nvsdata = config.to_blob()?;
        info!(
            "Encoded config to {sz} bytes. Saving to nvs...",
            sz = nvsdata.len()
        );

        match self.nvs.set_raw(CONFIG_NAME, &nvsdata) {
            Ok(_) => {
                info!("Config saved.");
                Ok(())
            }
            Err(e) => bail!("Cannot save to nvs: {e:?}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::display::tests::FakeLcd;
    use tokio::time::Instant;

    #[derive(Default)]
    pub(crate) struct MemStore {
        pub blob: Option<Vec<u8>>,
        pub fail_writes: bool,
    }

    impl ConfigStorage for MemStore {
        fn load(&mut self) -> anyhow::Result<Option<MyConfig>> {
            self.blob.as_deref().map(MyConfig::from_blob).transpose()
        }

        fn save(&mut self, config: &MyConfig) -> anyhow::Result<()> {
            if self.fail_writes {
                bail!("flash write failed");
            }
            self.blob = Some(config.to_blob()?);
            Ok(())
        }
    }

    fn sample() -> MyConfig {
        MyConfig {
            ssid: "home".into(),
            pass: "hunter2".into(),
            api_key: "AIza-key".into(),
            channel_id: "UC123".into(),
            text: "Subscribe!".into(),
        }
    }

    #[test]
    fn blob_is_keyed_json_with_checksum() {
        let blob = sample().to_blob().unwrap();
        let json = std::str::from_utf8(&blob[..blob.len() - CRC_LEN]).unwrap();
        for key in ["\"ssid\"", "\"pass\"", "\"api_key\"", "\"channel_id\"", "\"text\""] {
            assert!(json.contains(key), "{key} missing from {json}");
        }
        assert_eq!(MyConfig::from_blob(&blob).unwrap(), sample());
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let json = br#"{"ssid":"home"}"#;
        let mut blob = json.to_vec();
        blob.extend_from_slice(&CONFIG_CRC.checksum(json).to_le_bytes());

        let c = MyConfig::from_blob(&blob).unwrap();
        assert_eq!(c.ssid, "home");
        assert!(c.pass.is_empty());
        assert!(c.api_key.is_empty());
        assert!(c.channel_id.is_empty());
        assert!(c.text.is_empty());
    }

    #[test]
    fn corrupt_blob_is_an_error() {
        let mut blob = sample().to_blob().unwrap();
        blob[3] ^= 0x20;
        assert!(MyConfig::from_blob(&blob).is_err());
        assert!(MyConfig::from_blob(&[1, 2]).is_err());
    }

    #[test]
    fn oversized_config_is_refused() {
        let c = MyConfig {
            text: "x".repeat(NVS_BUF_SIZE),
            ..sample()
        };
        assert!(c.to_blob().is_err());
    }

    #[test]
    fn store_distinguishes_missing_from_corrupt() {
        let mut store = MemStore::default();
        assert!(store.load().unwrap().is_none());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));

        store.blob = Some(b"{}\0\0\0\0".to_vec());
        assert!(store.load().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_config_writes_back_defaults() {
        let mut store = MemStore::default();
        let mut display = DisplayScheduler::new(FakeLcd::new());

        let c = load_config(&mut store, &mut display).await;

        assert_eq!(c, MyConfig::default());
        assert_eq!(store.load().unwrap(), Some(MyConfig::default()));
        assert!(display.lcd().row0_prints.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_back_still_boots() {
        let mut store = MemStore {
            fail_writes: true,
            ..MemStore::default()
        };
        let mut display = DisplayScheduler::new(FakeLcd::new());

        let c = load_config(&mut store, &mut display).await;

        assert_eq!(c, MyConfig::default());
        assert!(store.blob.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_config_is_reported_and_kept() {
        let bad = b"{}\0\0\0\0".to_vec();
        let mut store = MemStore {
            blob: Some(bad.clone()),
            ..MemStore::default()
        };
        let mut display = DisplayScheduler::new(FakeLcd::new());

        let start = Instant::now();
        let c = load_config(&mut store, &mut display).await;

        assert_eq!(c, MyConfig::default());
        assert_eq!(display.lcd().row(0), "Config error    ");
        assert_eq!(display.lcd().row(1), "using defaults  ");
        assert!(start.elapsed() >= CONFIG_NOTICE_HOLD);
        assert_eq!(store.blob, Some(bad));
    }

    #[tokio::test(start_paused = true)]
    async fn stored_config_is_used_as_is() {
        let mut store = MemStore::default();
        store.save(&sample()).unwrap();
        let mut display = DisplayScheduler::new(FakeLcd::new());

        assert_eq!(load_config(&mut store, &mut display).await, sample());
        assert_eq!(display.lcd().clears, 0);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let dump = format!("{:#?}", sample());
        assert!(!dump.contains("hunter2"));
        assert!(!dump.contains("AIza-key"));
        assert!(dump.contains("<7 chars>"));
        assert!(dump.contains("Subscribe!"));
    }
}

// EOF
