// counter.rs

use log::*;
use tokio::time::Instant;

use crate::*;

pub struct Counter<R, D, S> {
    pub connectivity: ConnectivityManager<R>,
    pub display: DisplayScheduler<D>,
    pub poller: StatsPoller,
    pub source: S,
}

impl<R: Radio, D: CharDisplay, S: StatsSource> Counter<R, D, S> {
    pub fn new(
        connectivity: ConnectivityManager<R>,
        display: DisplayScheduler<D>,
        source: S,
    ) -> Self {
        Self {
            connectivity,
            display,
            poller: StatsPoller::new(Instant::now()),
            source,
        }
    }

    pub async fn step(&mut self, state: &MyState) -> PollOutcome {
        let config = state.config.read().await.clone();

        let net = self.connectivity.current_state(&config);
        {
            let mut shared = state.connectivity.write().await;
            if *shared != net {
                info!("Connectivity: {} -> {}", *shared, net);
                *shared = net;
            }
        }

        let outcome = self.poller.tick(
            &mut self.source,
            net.is_connected(),
            &config.api_key,
            &config.channel_id,
            Instant::now(),
        );
        if matches!(outcome, PollOutcome::Offline | PollOutcome::Unconfigured) {
            debug!("Poll skipped: {outcome:?}");
        }

        let snapshot = self.poller.snapshot();
        if let Err(e) = Box::pin(self.display.render_cycle(&config.text, snapshot)).await {
            error!("Render cycle failed: {e:#}");
        }
        outcome
    }

    pub async fn run(mut self, state: Arc<Pin<Box<MyState>>>) -> anyhow::Result<()> {
        loop {
            Box::pin(self.step(&state)).await;
        }
    }
}


// EOF
