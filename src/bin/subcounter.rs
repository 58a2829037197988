// bin/subcounter.rs

#![warn(clippy::large_futures)]

#[cfg(target_os = "espidf")]
use firmware::*;

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!(
        "{} is ESP-IDF firmware, build it for an espidf target.",
        env!("CARGO_BIN_NAME")
    );
    std::process::exit(1);
}

#[cfg(target_os = "espidf")]
mod firmware {
    pub use std::{sync::Arc, time::Duration};

    pub use esp_idf_hal::delay::{Ets, FreeRtos};
    pub use esp_idf_hal::gpio::{AnyInputPin, Input, InputPin, PinDriver};
    pub use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    pub use esp_idf_hal::prelude::*;
    pub use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs, wifi::EspWifi};
    pub use esp_idf_sys::esp;
    pub use log::*;
    pub use subcounter::*;
    pub use tokio::time::sleep;
}

#[cfg(target_os = "espidf")]
const CONFIG_RESET_COUNT: i32 = 9;

#[cfg(target_os = "espidf")]
esp_idf_sys::esp_app_desc!();

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // eventfd is needed by our mio poll implementation.  Note you should set max_fds
    // higher if you have other code that may need eventfd.

    #[allow(clippy::needless_update)]
    let config = esp_idf_sys::esp_vfs_eventfd_config_t {
        max_fds: 1,
        ..Default::default()
    };
    esp! { unsafe { esp_idf_sys::esp_vfs_eventfd_register(&config) } }?;

    info!("Hello.");
    info!("Starting up, firmware v{FW_VERSION}");

    let sysloop = EspSystemEventLoop::take()?;
    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

    let ns = env!("CARGO_BIN_NAME");
    let nvs = nvs::EspNvs::new(nvs_default_partition.clone(), ns, true)?;
    info!("Got namespace {ns:?} from default partition");
    let mut store = NvsConfigStore::new(nvs);

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    #[cfg(feature = "esp32c3")]
    let (button_pin, sda, scl) = (pins.gpio9.downgrade_input(), pins.gpio5, pins.gpio6);

    #[cfg(feature = "esp32s")]
    let (button_pin, sda, scl) = (pins.gpio0.downgrade_input(), pins.gpio21, pins.gpio22);

    let button = PinDriver::input(button_pin)?;

    let i2c_config = I2cConfig::new().baudrate(100.kHz().into());
    let i2c = I2cDriver::new(peripherals.i2c0, sda, scl, &i2c_config)?;
    let mut lcd = Lcd1602::new(i2c, Ets, LCD_I2C_ADDR);
    if let Err(e) = lcd.init() {
        error!("LCD init failed, running without display: {e:#}");
    }
    let mut display = DisplayScheduler::new(lcd);
    if let Err(e) = display.show_status("SubCounter", &format!("v{FW_VERSION}")) {
        error!("Display error: {e:#}");
    }

    let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_default_partition))?;
    let radio = EspRadio::new(wifi);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(async move {
            #[cfg(feature = "reset_settings")]
            let config = {
                let c = MyConfig::default();
                if let Err(e) = store.save(&c) {
                    error!("Cannot reset settings: {e:#}");
                }
                c
            };

            #[cfg(not(feature = "reset_settings"))]
            let config = Box::pin(load_config(&mut store, &mut display)).await;
            info!("My config:\n{config:#?}");

            let shared_state = Arc::new(Box::pin(MyState::new(config.clone(), Box::new(store))));

            let mut connectivity = ConnectivityManager::new(radio);
            let net = match Box::pin(connectivity.bootstrap(&config, &mut display)).await {
                Ok(net) => net,
                Err(e) => {
                    error!("Network bring-up failed: {e:#}");
                    error!("Resetting...");
                    sleep(Duration::from_secs(5)).await;
                    esp_idf_hal::reset::restart();
                }
            };
            info!("Connectivity: {net}");
            *shared_state.connectivity.write().await = net;

            let counter = Counter::new(connectivity, display, YoutubeStats);

            info!("Entering main loop...");
            tokio::select! {
                _ = Box::pin(poll_reset(shared_state.clone(), button)) => { error!("poll_reset() ended."); }
                _ = Box::pin(counter.run(shared_state.clone())) => { error!("counter.run() ended."); }
                _ = Box::pin(run_portal(shared_state.clone())) => { error!("run_portal() ended."); }
            };
        }));

    // not actually returning from main() but we reboot instead
    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

#[cfg(target_os = "espidf")]
async fn poll_reset(
    state: Arc<std::pin::Pin<Box<MyState>>>,
    button: PinDriver<'_, AnyInputPin, Input>,
) -> anyhow::Result<()> {
    loop {
        sleep(Duration::from_millis(500)).await;

        if *state.reset.read().await {
            info!("Restarting in {RESTART_DELAY:?}...");
            sleep(RESTART_DELAY).await;
            esp_idf_hal::reset::restart();
        }

        if button.is_low() {
            Box::pin(reset_button(&state, &button)).await?;
        }
    }
}

#[cfg(target_os = "espidf")]
async fn reset_button(
    state: &Arc<std::pin::Pin<Box<MyState>>>,
    button: &PinDriver<'_, AnyInputPin, Input>,
) -> anyhow::Result<()> {
    let mut reset_cnt = CONFIG_RESET_COUNT;

    while button.is_low() {
        // button is pressed and kept down, countdown and factory reset if reach zero
        let msg = format!("Reset? {reset_cnt}");
        error!("{msg}");

        if reset_cnt == 0 {
            // okay do factory reset now
            error!("Factory resetting...");

            let new_config = MyConfig::default();
            state.store.write().await.save(&new_config)?;
            sleep(Duration::from_millis(2000)).await;
            esp_idf_hal::reset::restart();
        }

        reset_cnt -= 1;
        sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}

// EOF
