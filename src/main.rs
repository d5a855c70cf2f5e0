use anyhow::anyhow;
use multisdr::config::RunConfig;
use multisdr::hal::{format_size, Device, Direction, HardwareRegistry, Kwargs, StreamFlags};

fn default_config() -> serde_json::Value {
    serde_json::json!({
        "args": {
            "driver[0]": "mock",
            "serial[0]": "MOCK0",
            "driver[1]": "mock",
            "serial[1]": "MOCK1",
            "rx_channels[1]": 3,
            "fill[1]": 16
        },
        "stream": {
            "direction": "input",
            "format": "CS16",
            "num_elems": 256,
            "reads": 3
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::from_json(default_config())?,
    };

    let registry = HardwareRegistry::with_registered();
    println!("Multi-device demo");
    println!("=================\n");
    println!("Drivers: {}", registry.list_drivers().join(", "));

    let mut args = config.args.clone();
    args.insert("driver".to_string(), "multi".to_string());

    let candidates = registry.discover_all(&args).await?;
    println!("Aggregate candidates: {}", candidates.len());
    for candidate in &candidates {
        let keys: Vec<String> = candidate.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("  {}", keys.join(" "));
    }

    let device = registry.make(&args)?;
    println!("\nDriver key:   {}", device.driver_key());
    println!("Hardware key: {}", device.hardware_key());

    for direction in [Direction::Input, Direction::Output] {
        let count = device.num_channels(direction);
        println!("{} channels: {} ({})", direction, count, device.frontend_mapping(direction));
        for channel in 0..count {
            let info = device.channel_info(direction, channel)?;
            let fields: Vec<String> = info.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            println!("  [{}] {}", channel, fields.join(" "));
        }
    }

    let stream = &config.stream;
    let channels: Vec<usize> = if stream.channels.is_empty() {
        (0..device.num_channels(stream.direction)).collect()
    } else {
        stream.channels.clone()
    };
    let elem_size = format_size(&stream.format)
        .ok_or_else(|| anyhow!("Unsupported stream format '{}'", stream.format))?;

    println!("\nStreaming {} on channels {:?}", stream.format, channels);
    let handle = device.setup_stream(stream.direction, &stream.format, &channels, &Kwargs::new())?;
    println!("MTU: {} elements", device.stream_mtu(&handle)?);
    device.activate_stream(&handle, StreamFlags::empty(), 0, 0)?;

    let mut storage = vec![vec![0u8; stream.num_elems * elem_size]; channels.len()];
    for i in 0..stream.reads {
        match stream.direction {
            Direction::Input => {
                let mut buffs: Vec<&mut [u8]> = storage.iter_mut().map(Vec::as_mut_slice).collect();
                let result = device.read_stream(
                    &handle,
                    &mut buffs,
                    stream.num_elems,
                    StreamFlags::empty(),
                    stream.timeout_us,
                )?;
                let markers: Vec<u8> = storage.iter().map(|b| b[0]).collect();
                println!(
                    "Read {}: {} elems, flags {:?}, time {} ns, channel markers {:?}",
                    i + 1,
                    result.elems,
                    result.flags,
                    result.time_ns,
                    markers
                );
            }
            Direction::Output => {
                let buffs: Vec<&[u8]> = storage.iter().map(Vec::as_slice).collect();
                let result = device.write_stream(
                    &handle,
                    &buffs,
                    stream.num_elems,
                    StreamFlags::empty(),
                    0,
                    stream.timeout_us,
                )?;
                println!("Write {}: {} elems, flags {:?}", i + 1, result.elems, result.flags);
            }
        }
    }

    let mut mask = 0u64;
    match device.read_stream_status(&handle, &mut mask, stream.timeout_us) {
        Ok(event) => println!("Status: {:?} on channel mask {:#b}", event.flags, mask),
        Err(e) => println!("No status: {:#}", e),
    }

    device.deactivate_stream(&handle, StreamFlags::empty(), 0)?;
    device.close_stream(handle);
    registry.unmake(device);
    println!("\nDone.");
    Ok(())
}
