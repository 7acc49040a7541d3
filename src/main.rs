use clap::{Parser, ValueEnum};
use log::{error, info};
use sensor_bridge::actuator::RgbLedController;
use sensor_bridge::agent::{
    Agent, Backoff, ConnectivitySupervisor, PayloadFormat, Publisher, SamplingEngine,
    SamplingPolicy,
};
use sensor_bridge::capability::AnalogInput;
use sensor_bridge::config::{self, Config, DeviceIdentity};
use sensor_bridge::input::mqtt::MqttBroker;
use sensor_bridge::input::simulation::pins::{
    SimulatedDigitalPin, SimulatedPwmChannel, SquareWavePin, WaveAnalogPin, drive_quadrature,
};
use sensor_bridge::input::simulation::network::SimulatedNetwork;
use sensor_bridge::sensors::{
    AnalogSensor, DigitalSensor, ImpactSensor, InterruptLatch, Polarity, PulseTrainSensor,
    RotaryEncoderSensor, Sensor, analog::Calibration,
};
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Which device this process pretends to be. Hardware pins are simulated;
/// the broker link is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Profile {
    /// Mercury tilt switch publishing structured state records
    Tilt,
    /// LP gas concentration with warm-up and bare ppm payloads
    Gas,
    /// Pulse train rate from a noisy analog line
    Pulse,
    /// Rotary encoder with push switch
    Encoder,
    /// Shock sensor fed by an interrupt latch
    Impact,
    /// RGB LED channel set driven by broker commands
    RgbLed,
}

impl Profile {
    fn slug(self) -> &'static str {
        match self {
            Profile::Tilt => "ky-020",
            Profile::Gas => "mq-2",
            Profile::Pulse => "ky-039",
            Profile::Encoder => "ky-040",
            Profile::Impact => "ky-031",
            Profile::RgbLed => "ky-016",
        }
    }

    fn default_topic(self) -> String {
        format!("gds0653/{}", self.slug())
    }

    fn sensor_name(self) -> &'static str {
        match self {
            Profile::Tilt => "inclinacion",
            Profile::Gas => "gas-lp",
            Profile::Pulse => "pulso",
            Profile::Encoder => "encoder",
            Profile::Impact => "impacto",
            Profile::RgbLed => "led_rgb",
        }
    }
}

#[derive(Parser)]
#[command(name = "sensor-bridge")]
#[command(about = "Sensor-to-MQTT device agent with simulated hardware profiles")]
struct Cli {
    /// Device profile to run
    #[arg(long, env = "SENSOR_PROFILE", value_enum, default_value = "tilt")]
    profile: Profile,

    /// Broker host override
    #[arg(long, env = "MQTT_BROKER_HOST")]
    broker: Option<String>,

    /// Publish topic override
    #[arg(long, env = "MQTT_PUBLISH_TOPIC")]
    topic: Option<String>,

    /// Client id override
    #[arg(long, env = "MQTT_CLIENT_ID")]
    client_id: Option<String>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Build the sensor, policy and payload format for one profile, plus any
/// driver tasks animating the simulated pins.
fn build_profile(
    profile: Profile,
) -> (
    Box<dyn Sensor>,
    SamplingPolicy,
    PayloadFormat,
    Vec<JoinHandle<()>>,
) {
    match profile {
        Profile::Tilt => {
            // The switch rocks every 3 seconds.
            let pin = SquareWavePin::new(Duration::from_secs(3));
            let sensor = DigitalSensor::new(
                profile.sensor_name(),
                Box::new(pin),
                Polarity::ActiveLow,
                "inclinado",
                "vertical",
            );
            (
                Box::new(sensor),
                SamplingPolicy::digital(),
                PayloadFormat::Structured,
                Vec::new(),
            )
        }

        Profile::Gas => {
            let pin: Box<dyn AnalogInput> =
                Box::new(WaveAnalogPin::new(1200, 600, Duration::from_secs(60), 40));
            let sensor = AnalogSensor::new(
                profile.sensor_name(),
                pin,
                Calibration::full_scale(1000.0),
                4,
            )
            .with_alarm(400.0, "alerta", "normal");
            (
                Box::new(sensor),
                SamplingPolicy::gas(),
                PayloadFormat::Bare,
                Vec::new(),
            )
        }

        Profile::Pulse => {
            // Crossing every 500ms reads as 120 events per minute.
            let pin: Box<dyn AnalogInput> =
                Box::new(WaveAnalogPin::new(2000, 400, Duration::from_millis(500), 20));
            let sensor = PulseTrainSensor::new(profile.sensor_name(), pin, 100);
            (
                Box::new(sensor),
                SamplingPolicy::pulse(),
                PayloadFormat::Structured,
                Vec::new(),
            )
        }

        Profile::Encoder => {
            let (clk, clk_handle) = SimulatedDigitalPin::new(true);
            let (dt, dt_handle) = SimulatedDigitalPin::new(true);
            let (sw, _sw_handle) = SimulatedDigitalPin::new(true);
            let driver = drive_quadrature(clk_handle, dt_handle, Duration::from_millis(400));
            let sensor = RotaryEncoderSensor::new(
                profile.sensor_name(),
                Box::new(clk),
                Box::new(dt),
                Box::new(sw),
                Polarity::ActiveLow,
                Duration::from_millis(50),
            );
            (
                Box::new(sensor),
                SamplingPolicy::encoder(),
                PayloadFormat::Structured,
                vec![driver],
            )
        }

        Profile::Impact => {
            let latch = InterruptLatch::new();
            let driver_latch = latch.clone();
            // Simulated knocks every 8 seconds, straight into the latch
            // the way a pin interrupt would.
            let driver = tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(8));
                loop {
                    interval.tick().await;
                    driver_latch.trigger(chrono::Utc::now().timestamp_millis() as u64);
                }
            });
            let sensor = ImpactSensor::new(profile.sensor_name(), latch, "impacto", "reposo");
            (
                Box::new(sensor),
                SamplingPolicy::impact(),
                PayloadFormat::Bare,
                vec![driver],
            )
        }

        Profile::RgbLed => {
            let sensor = RgbLedController::new(
                profile.sensor_name(),
                Box::new(SimulatedPwmChannel::new()),
                Box::new(SimulatedPwmChannel::new()),
                Box::new(SimulatedPwmChannel::new()),
            );
            (
                Box::new(sensor),
                SamplingPolicy::rgb(),
                PayloadFormat::Structured,
                Vec::new(),
            )
        }
    }
}

#[tokio::main]
async fn main() {
    config::load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(broker) = cli.broker {
        config.mqtt.broker_host = broker;
    }
    config.mqtt.publish_topic = cli
        .topic
        .unwrap_or_else(|| cli.profile.default_topic());
    config.mqtt.client_id = cli.client_id.unwrap_or_else(|| {
        format!(
            "esp32-{}-{}",
            cli.profile.slug(),
            &Uuid::new_v4().simple().to_string()[..8]
        )
    });
    if cli.profile == Profile::RgbLed {
        // The RGB controller listens for commands on its own topic.
        config.mqtt.subscribe_topic = Some(config.mqtt.publish_topic.clone());
    }

    let identity = match DeviceIdentity::from_config(&config.mqtt) {
        Ok(identity) => identity,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Sensor Bridge");
    info!("  Profile: {}", cli.profile.slug());
    info!("  Broker: {}:{}", identity.broker_host, identity.broker_port);
    info!("  Client ID: {}", identity.client_id);
    info!("  Publish Topic: {}", identity.publish_topic);
    if let Some(topic) = &identity.subscribe_topic {
        info!("  Subscribe Topic: {}", topic);
    }

    let (network, _network_handle) = SimulatedNetwork::new();
    let supervisor = ConnectivitySupervisor::new(
        Box::new(network),
        Box::new(MqttBroker::new()),
        Backoff {
            initial: Duration::from_millis(config.fault.backoff_initial_ms),
            max: Duration::from_millis(config.fault.backoff_max_ms),
            factor: config.fault.backoff_factor,
        },
        config.network.max_connect_attempts,
    );

    let (sensor, policy, format, drivers) = build_profile(cli.profile);
    let engine = match SamplingEngine::new(policy) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Invalid sampling policy: {}", e);
            std::process::exit(1);
        }
    };
    let publisher = Publisher::new(
        cli.profile.sensor_name(),
        identity.publish_topic.clone(),
        format,
    );

    let agent = Agent::new(identity, supervisor, engine, publisher, sensor, &config.fault);

    tokio::select! {
        result = agent.run() => {
            if let Err(e) = result {
                error!("Agent stopped unexpectedly: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    for driver in drivers {
        driver.abort();
    }
    info!("Sensor Bridge stopped");
}
