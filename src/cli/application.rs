use futures::StreamExt;
use log::{error, info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::cli::types::Args;
use crate::config::io::ConfigStore;
use crate::config::types::Config;
use crate::device::btle::BtleRadio;
use crate::device::types::{DeviceHandle, ScanEvent, SessionEvent, SessionState};
use crate::error::AppRunError;
use crate::monitor::HeartRateMonitor;

fn describe(index: usize, device: &DeviceHandle) -> String {
    let name = device.display_name.as_deref().unwrap_or("Unnamed device");
    format!("[{}] {}\n    {}", index, name, device.identifier)
}

async fn load_config(store: &ConfigStore) -> Config {
    match store.load().await {
        Ok(config) => config,
        Err(err) => {
            if err.is_file_not_found_error() {
                info!("Config file not found, using defaults");
            } else {
                error!("Failed to load config: {:?}", &err);
            }
            Config::default()
        },
    }
}

async fn prompt_device(lines: &mut Lines<BufReader<Stdin>>, count: usize) -> Result<Option<usize>, AppRunError> {
    loop {
        println!("Select a device [0-{}]:", count - 1);

        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };

        match line.trim().parse::<usize>() {
            Ok(index) if index < count => return Ok(Some(index)),
            _ => println!("Not a device number: {}", line.trim()),
        }
    }
}

pub async fn run_application(args: Args) -> Result<(), AppRunError> {
    let store = ConfigStore::open_default()?;
    let mut instance_lock = store.instance_lock()?;
    let _guard = instance_lock.acquire()?;

    let mut config = load_config(&store).await;
    args.apply(&mut config);
    if args.save_config {
        store.save(&config).await?;
    }

    let (radio, radio_events) = BtleRadio::open(config.radio_settings()).await?;
    let (monitor, driver) = HeartRateMonitor::new(radio, radio_events, config.scan_duration());

    println!("Scanning for {} s...", config.scan_duration_secs);
    let mut scan = monitor.start_scan();
    let mut found = 0;
    while let Some(event) = scan.next().await {
        match event {
            ScanEvent::Found(device) => {
                println!("{}", describe(found, &device));
                found += 1;
            },
            ScanEvent::Complete => println!("BLE scan finished"),
        }
    }

    let devices = monitor.devices();
    let mut lines = BufReader::new(stdin()).lines();

    let index = match args.device {
        Some(index) => Some(index),
        None if devices.is_empty() => None,
        None => prompt_device(&mut lines, devices.len()).await?,
    };

    let Some(index) = index else {
        println!("No device selected");
        monitor.shutdown();
        let _ = driver.await;
        return Ok(());
    };

    let mut events = monitor.events();
    if let Some(device) = devices.get(index) {
        println!("Connecting to: {}", device.display_name.as_deref().unwrap_or(&device.identifier));
    }
    monitor.connect(index).await?;

    let mut pending_send = args.send.clone();
    let mut stdin_open = true;

    'mainloop: loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Disconnecting...");
                monitor.disconnect().await?;
            },
            event = events.next() => match event {
                Some(SessionEvent::StateChange(state)) => {
                    match state {
                        SessionState::Streaming => {
                            println!("Notifications enabled; type a line to send it as configuration");
                            if let Some(text) = pending_send.take() {
                                match monitor.send_config(&text).await {
                                    Ok(()) => println!("Configuration sent"),
                                    Err(err) => println!("Could not send configuration: {}", err),
                                }
                            }
                        },
                        SessionState::Disconnected(reason) => {
                            println!("Disconnected: {}", reason);
                            break 'mainloop;
                        },
                        state => println!("{}", state),
                    }
                },
                Some(SessionEvent::Reading(reading)) => println!("Heart Rate: {} bpm", reading.bpm),
                Some(SessionEvent::WriteFailed(message)) => println!("Could not send configuration: {}", message),
                None => break 'mainloop,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(text) => match monitor.send_config(&text).await {
                    Ok(()) => println!("Configuration sent"),
                    Err(err) => println!("Could not send configuration: {}", err),
                },
                None => stdin_open = false,
            },
        }
    }

    monitor.shutdown();
    if let Err(err) = driver.await {
        warn!("Monitor task did not stop cleanly: {:?}", err);
    }
    Ok(())
}
