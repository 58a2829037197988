// stats.rs

use anyhow::{anyhow, bail};
use log::*;
use serde::Deserialize;
use tokio::time::{Duration, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024;

const API_URL: &str = "https://www.googleapis.com/youtube/v3/channels";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub value: u64,
    pub fetched_at: Instant,
}

pub trait StatsSource {
    fn fetch(&mut self, api_key: &str, channel_id: &str) -> anyhow::Result<u64>;
}

pub fn should_poll(now: Instant, last_poll: Instant, had_first_poll: bool) -> bool {
    !had_first_poll || now.saturating_duration_since(last_poll) >= POLL_INTERVAL
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    NotDue,
    Offline,
    Unconfigured,
    Updated(u64),
    Failed,
}

pub struct StatsPoller {
    snapshot: Option<StatsSnapshot>,
    last_poll: Instant,
    had_first_poll: bool,
}

impl StatsPoller {
    pub fn new(now: Instant) -> Self {
        Self {
            snapshot: None,
            last_poll: now,
            had_first_poll: false,
        }
    }

    pub fn snapshot(&self) -> Option<&StatsSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        should_poll(now, self.last_poll, self.had_first_poll)
    }

    pub fn poll<S: StatsSource>(
        &mut self,
        source: &mut S,
        api_key: &str,
        channel_id: &str,
        now: Instant,
    ) -> anyhow::Result<&StatsSnapshot> {
        let value = source.fetch(api_key, channel_id)?;
        self.last_poll = now;
        self.had_first_poll = true;
        Ok(&*self.snapshot.insert(StatsSnapshot {
            value,
            fetched_at: now,
        }))
    }

    /// Poll when due and the preconditions hold. Missing preconditions are
    /// skips, not errors, so the next cycle simply tries again.
    pub fn tick<S: StatsSource>(
        &mut self,
        source: &mut S,
        online: bool,
        api_key: &str,
        channel_id: &str,
        now: Instant,
    ) -> PollOutcome {
        if !self.is_due(now) {
            return PollOutcome::NotDue;
        }
        if !online {
            return PollOutcome::Offline;
        }
        if api_key.is_empty() || channel_id.is_empty() {
            return PollOutcome::Unconfigured;
        }

        match self.poll(source, api_key, channel_id, now) {
            Ok(snap) => {
                info!("Fetched count: {}", snap.value);
                PollOutcome::Updated(snap.value)
            }
            Err(e) => {
                error!("Fetching count failed: {e:#}");
                PollOutcome::Failed
            }
        }
    }
}

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize)]
struct ChannelItem {
    statistics: ChannelStatistics,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    subscriber_count: String,
}

pub fn channel_url(api_key: &str, channel_id: &str) -> String {
    format!(
        "{API_URL}?part=statistics&id={}&key={}",
        url_encode(channel_id),
        url_encode(api_key)
    )
}

/// Pull `items[0].statistics.subscriberCount` out of a channels response.
pub fn parse_subscriber_count(body: &str) -> anyhow::Result<u64> {
    let list: ChannelList = serde_json::from_str(body)?;
    let Some(item) = list.items.first() else {
        bail!("Channel not found in response");
    };
    item.statistics
        .subscriber_count
        .parse()
        .map_err(|e| anyhow!("Bad subscriberCount {:?}: {e}", item.statistics.subscriber_count))
}

fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(target_os = "espidf")]
pub struct YoutubeStats;

#[cfg(target_os = "espidf")]
impl StatsSource for YoutubeStats {
    fn fetch(&mut self, api_key: &str, channel_id: &str) -> anyhow::Result<u64> {
        use embedded_svc::http::{client::Client as HttpClient, Method};
        use embedded_svc::io::Read;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let config = Configuration {
            timeout: Some(FETCH_TIMEOUT),
            use_global_ca_store: true,
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut client = HttpClient::wrap(EspHttpConnection::new(&config)?);

        let url = channel_url(api_key, channel_id);
        let mut resp = client.request(Method::Get, &url, &[])?.submit()?;
        let status = resp.status();
        info!("Stats request -> status {status}");
        if status != 200 {
            bail!("HTTP error: status {status}");
        }

        let mut body = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = resp.read(&mut buf)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
            if body.len() > MAX_RESPONSE_SIZE {
                bail!("Response too large (>{MAX_RESPONSE_SIZE} bytes)");
            }
        }

        parse_subscriber_count(std::str::from_utf8(&body)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct FakeSource {
        pub results: Vec<anyhow::Result<u64>>,
        pub calls: usize,
    }

    impl FakeSource {
        pub fn new(results: Vec<anyhow::Result<u64>>) -> Self {
            Self { results, calls: 0 }
        }
    }

    impl StatsSource for FakeSource {
        fn fetch(&mut self, _api_key: &str, _channel_id: &str) -> anyhow::Result<u64> {
            self.calls += 1;
            if self.results.is_empty() {
                bail!("no more results");
            }
            self.results.remove(0)
        }
    }

    #[test]
    fn first_evaluation_is_always_due() {
        let t0 = Instant::now();
        assert!(should_poll(t0, t0, false));
        assert!(should_poll(t0, t0 + Duration::from_secs(3600), false));
        assert!(!should_poll(t0, t0, true));
    }

    #[test]
    fn due_again_only_after_the_interval() {
        let t0 = Instant::now();
        let mut source = FakeSource::new(vec![Ok(10)]);
        let mut poller = StatsPoller::new(t0);

        assert!(poller.is_due(t0));
        poller.poll(&mut source, "key", "chan", t0).unwrap();
        assert!(!poller.is_due(t0));
        assert!(!poller.is_due(t0 + POLL_INTERVAL - Duration::from_millis(1)));
        assert!(poller.is_due(t0 + POLL_INTERVAL));
    }

    #[test]
    fn failed_poll_leaves_snapshot_untouched() {
        let t0 = Instant::now();
        let t1 = t0 + POLL_INTERVAL;
        let mut source = FakeSource::new(vec![Ok(10), Err(anyhow!("timeout"))]);
        let mut poller = StatsPoller::new(t0);

        poller.poll(&mut source, "key", "chan", t0).unwrap();
        let before = poller.snapshot().cloned();

        assert!(poller.poll(&mut source, "key", "chan", t1).is_err());
        assert_eq!(poller.snapshot().cloned(), before);
        assert_eq!(poller.snapshot().unwrap().fetched_at, t0);
        // still due, so the next cycle retries
        assert!(poller.is_due(t1));
    }

    #[test]
    fn failed_first_poll_keeps_no_data() {
        let t0 = Instant::now();
        let mut source = FakeSource::new(vec![Err(anyhow!("dns"))]);
        let mut poller = StatsPoller::new(t0);

        assert_eq!(poller.tick(&mut source, true, "key", "chan", t0), PollOutcome::Failed);
        assert!(poller.snapshot().is_none());
        assert!(poller.is_due(t0));
    }

    #[test]
    fn missing_preconditions_skip_without_fetching() {
        let t0 = Instant::now();
        let mut source = FakeSource::new(vec![Ok(5)]);
        let mut poller = StatsPoller::new(t0);

        assert_eq!(poller.tick(&mut source, false, "key", "chan", t0), PollOutcome::Offline);
        assert_eq!(poller.tick(&mut source, true, "", "chan", t0), PollOutcome::Unconfigured);
        assert_eq!(poller.tick(&mut source, true, "key", "", t0), PollOutcome::Unconfigured);
        assert_eq!(source.calls, 0);

        assert_eq!(poller.tick(&mut source, true, "key", "chan", t0), PollOutcome::Updated(5));
        assert_eq!(poller.tick(&mut source, true, "key", "chan", t0), PollOutcome::NotDue);
        assert_eq!(source.calls, 1);
    }

    #[test]
    fn parses_channel_statistics() {
        let body = r#"{
            "kind": "youtube#channelListResponse",
            "items": [{
                "id": "UC123",
                "statistics": {
                    "viewCount": "99999",
                    "subscriberCount": "1234",
                    "hiddenSubscriberCount": false,
                    "videoCount": "42"
                }
            }]
        }"#;
        assert_eq!(parse_subscriber_count(body).unwrap(), 1234);
    }

    #[test]
    fn malformed_responses_are_errors() {
        assert!(parse_subscriber_count("not json").is_err());
        assert!(parse_subscriber_count(r#"{"items": []}"#).is_err());
        assert!(parse_subscriber_count(r#"{"error": {"code": 403}}"#).is_err());
        assert!(
            parse_subscriber_count(r#"{"items": [{"statistics": {"subscriberCount": "lots"}}]}"#)
                .is_err()
        );
    }

    #[test]
    fn query_values_are_encoded() {
        assert_eq!(
            channel_url("a b&c", "UC_x-1"),
            "https://www.googleapis.com/youtube/v3/channels?part=statistics&id=UC_x-1&key=a%20b%26c"
        );
    }
}

// EOF
