use std::{path::PathBuf, thread, time::Duration};

use clap::{Parser, ValueEnum};
use inquire::Select;
use log::{error, info};

use fronius_sunspec::{
    backoff::{Backoff, retry_when},
    config::Config,
    device::Device,
    error::{Error, Result},
    inverter::Inverter,
    meter::Meter,
    transport::{self, Link, ModbusClient},
    types::{DcInput, Phase, Voltage},
};

// How many times to try connecting and validating before giving up.
const ATTEMPTS: u32 = 5;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Inverter,
    Meter,
}

/// Poll a Fronius inverter or smart meter over SunSpec Modbus.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// YAML config file. Other connection options are ignored when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device class to detect.
    #[arg(short, long, value_enum, default_value_t = Kind::Inverter)]
    kind: Kind,

    /// Modbus TCP host. Modbus RTU is used when omitted.
    #[arg(long)]
    host: Option<String>,

    #[arg(long, default_value_t = 502)]
    port: u32,

    /// Serial device. Prompted for when using RTU without one.
    #[arg(long)]
    device: Option<String>,

    #[arg(long, default_value_t = 9600)]
    baud: u32,

    #[arg(long, default_value_t = 1)]
    slave_id: u8,

    /// Seconds between polls.
    #[arg(short, long, default_value_t = 5)]
    interval: u64,

    /// Stop after this many polls.
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Trace raw Modbus frames.
    #[arg(long)]
    debug: bool,
}

fn select_serial_port() -> String {
    let ports = serialport::available_ports().expect("Failed to enumerate serial ports");
    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }
    let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();
    Select::new("Select a serial port:", port_names)
        .prompt()
        .expect("Failed to select port")
}

fn load_config(args: &Args) -> Config {
    if let Some(path) = &args.config {
        return Config::from_file(path).expect("Invalid config file");
    }

    let use_tcp = args.host.is_some();
    let device = match (&args.device, use_tcp) {
        (Some(device), _) => device.clone(),
        (None, false) => select_serial_port(),
        (None, true) => String::new(),
    };
    let config = Config {
        use_tcp,
        host: args.host.clone().unwrap_or_default(),
        port: args.port,
        device,
        baud: args.baud,
        slave_id: args.slave_id,
        debug: args.debug,
        ..Config::default()
    };
    config.validate().expect("Invalid options");
    config
}

fn sleep(delay: fugit::MicrosDurationU64) {
    thread::sleep(Duration::from_micros(delay.to_micros()));
}

/// Connect and run detection, reconnecting after link failures.
///
/// A timeout while reading the common model loses the session, so each attempt opens a
/// fresh connection.
fn open<D: Device<Transport = ModbusClient<Link>>>(
    config: &Config,
    backoff: &mut Backoff,
    new: impl Fn(ModbusClient<Link>) -> D,
) -> Result<D> {
    retry_when(
        backoff,
        ATTEMPTS,
        || {
            let mut device = new(transport::connect(config)?);
            device.validate()?;
            Ok(device)
        },
        sleep,
        Error::is_reconnectable,
    )
}

fn print_inverter(inverter: &Inverter<ModbusClient<Link>>) -> Result<()> {
    println!(
        "AC {:.1} W, {:.2} A, {:.1} V, {:.2} Hz | DC {:.1} W, {:.1} V | {} Wh | {}",
        inverter.ac_power()?,
        inverter.ac_current(Phase::Total)?,
        inverter.ac_voltage(Voltage::A)?,
        inverter.frequency()?,
        inverter.dc_power(DcInput::Total)?,
        inverter.dc_voltage(DcInput::Total)?,
        inverter.lifetime_energy()?,
        inverter.vendor_state()?,
    );
    for input in 1..=2 {
        if let Ok(power) = inverter.dc_power(DcInput::Mppt(input)) {
            println!("  MPPT {}: {:.1} W", input, power);
        }
    }
    if inverter.has_storage()? {
        println!(
            "  Battery {:.1} % ({})",
            inverter.state_of_charge()?,
            inverter.charge_status()?
        );
    }
    Ok(())
}

fn print_meter(meter: &Meter<ModbusClient<Link>>) -> Result<()> {
    println!(
        "{:.1} W, {:.2} A, {:.1} V, {:.2} Hz | imported {} Wh, exported {} Wh",
        meter.power(Phase::Total)?,
        meter.current(Phase::Total)?,
        meter.voltage(Voltage::Average)?,
        meter.frequency()?,
        meter.energy_imported(Phase::Total)?,
        meter.energy_exported(Phase::Total)?,
    );
    Ok(())
}

fn poll<D: Device<Transport = ModbusClient<Link>>>(
    args: &Args,
    config: &Config,
    new: impl Fn(ModbusClient<Link>) -> D,
    print: impl Fn(&D) -> Result<()>,
) -> Result<()> {
    let mut backoff = Backoff::from_config(config);
    let mut device = open(config, &mut backoff, &new)?;
    info!(
        "Connected to {} {} (serial {})",
        device.manufacturer()?,
        device.model()?,
        device.serial_number()?
    );

    let mut polls = 0;
    loop {
        if let Err(err) = print(&device) {
            error!("Decode failed: {}", err);
        }
        polls += 1;
        if args.count.is_some_and(|count| polls >= count) {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(args.interval));

        if let Err(err) = device.refresh() {
            if !err.is_reconnectable() {
                return Err(err);
            }
            error!("Refresh failed, reconnecting: {}", err);
            device = open(config, &mut backoff, &new)?;
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args);

    let result = match args.kind {
        Kind::Inverter => poll(&args, &config, Inverter::new, print_inverter),
        Kind::Meter => poll(&args, &config, Meter::new, print_meter),
    };
    if let Err(err) = result {
        let severity = if err.is_transient() { "transient" } else { "fatal" };
        eprintln!("{} ({}): {}", err.code(), severity, err);
        std::process::exit(1);
    }
}
