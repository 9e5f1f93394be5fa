// bin/multical21wmbus.rs

#![warn(clippy::large_futures)]

use multical21wmbus::*;

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_hal::{
        delay::FreeRtos,
        gpio::{AnyInputPin, OutputPin},
        peripherals::Peripherals,
        spi,
        units::FromValueType,
    };
    use esp_idf_svc::nvs;
    use esp_idf_sys::esp;

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    #[allow(clippy::needless_update)]
    let config = esp_idf_sys::esp_vfs_eventfd_config_t {
        max_fds: 1,
        ..Default::default()
    };
    esp! { unsafe { esp_idf_sys::esp_vfs_eventfd_register(&config) } }?;

    info!("Hello, {} v{}.", env!("CARGO_BIN_NAME"), FW_VERSION);

    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;
    let ns = env!("CARGO_BIN_NAME");
    let mut nvs = match nvs::EspNvs::new(nvs_default_partition, ns, true) {
        Ok(nvs) => {
            info!("Got namespace {ns:?} from default partition");
            nvs
        }
        Err(e) => panic!("Could not get namespace {ns}: {e:?}"),
    };

    let config = match MyConfig::from_nvs(&mut nvs) {
        None => {
            error!("Could not read nvs config, using defaults");
            let c = MyConfig::default();
            c.to_nvs(&mut nvs)?;
            info!("Successfully saved default config to nvs.");
            c
        }
        Some(c) => c,
    };
    info!("My config:\n{config:#?}");

    let (meter_id, meter_key) = match config.credentials() {
        Ok(creds) => creds,
        Err(e) => {
            error!("{e}. Radio idle.");
            loop {
                FreeRtos::delay_ms(3_600_000);
            }
        }
    };

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    // SPI pins: GPIO4=SCK, GPIO6=MOSI, GPIO5=MISO, GPIO7=CS
    let driver = spi::SpiDriver::new(
        peripherals.spi2,
        pins.gpio4,
        pins.gpio6,
        Some(pins.gpio5),
        &spi::SpiDriverConfig::new(),
    )?;
    let spi_cfg = spi::config::Config::new().baudrate(4.MHz().into());
    let spi_bus = spi::SpiBusDriver::new(driver, &spi_cfg)?;
    let bus = esp_register_bus(spi_bus, pins.gpio7.downgrade_output())?;

    // SAFETY: the GDO0 pin is not handed to any other driver
    let gdo0 = unsafe { AnyInputPin::new(config.gdo0_pin as i32) };
    let irq = Gdo0Interrupt::new(gdo0)?;

    let radio = RadioController::new(bus, FreeRtos);
    let pipeline = FramePipeline::new(meter_id, meter_key);
    let mut receiver = Receiver::new(radio, irq, &PACKET_SIGNAL, pipeline);
    let mut publisher = LogPublisher;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(async {
            info!("Entering main loop...");
            if let Err(e) = Box::pin(receiver.run(&mut publisher)).await {
                error!("receiver.run() ended: {e:?}");
            }
        }));

    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

/// Replay captured frames: one hex frame per line on stdin (L-field first),
/// one JSON reading per accepted frame on stdout. Diagnostics go through
/// `log`; set `RUST_LOG` to see them.
#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use std::io::{self, BufRead};

    env_logger::init();
    info!("Hello, {} v{}.", env!("CARGO_BIN_NAME"), FW_VERSION);

    let config = MyConfig::from_env();
    let (meter_id, meter_key) = config.credentials()?;
    let mut pipeline = FramePipeline::new(meter_id, meter_key);
    let mut publisher = WriterPublisher::new(io::stdout().lock());

    for (lineno, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        let hex: String = line.split_whitespace().collect();
        if hex.is_empty() || hex.starts_with('#') {
            continue;
        }
        let Some(bytes) = parse_hex(&hex) else {
            warn!("line {}: not a hex frame", lineno + 1);
            continue;
        };
        match pipeline.process(&RawFrame::new(&bytes, Instant::now())) {
            Ok(reading) => publisher.publish(&reading),
            Err(e) => warn!("line {}: {e}", lineno + 1),
        }
    }

    info!("Counters: {}", serde_json::to_string(pipeline.counters())?);
    Ok(())
}

// EOF
