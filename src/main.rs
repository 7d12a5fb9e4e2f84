use gauge::{generate_samples, Gauge, GaugeConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = GaugeConfig::builder()
        .title("Radial gauge".to_string())
        .build();

    let mut gauge = Gauge::new(config);
    gauge.set_samples(&generate_samples(60))?;

    println!("Drag the red handle around the circle to set the value.");
    println!("The spectrum plot grows in after a short delay.");

    gauge.show()
}
