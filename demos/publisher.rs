//! Example Publisher
//!
//! Publishes one `TransmissionData` sample per second on "My/Funk/ServiceName".
//! Start `subscriber` in another terminal; it also receives the last samples
//! sent before it started.
//!
//! Run with `RUST_LOG=debug` to see service and endpoint lifecycle logs.

use std::time::Duration;
use venom_pubsub::{relocatable, Node, NodeEvent, SendError, Service, ServiceConfig};

const CYCLE_TIME: Duration = Duration::from_secs(1);
const HISTORY_SIZE: usize = 20;

relocatable! {
    type_name = "TransmissionData";
    #[derive(Debug, Default, Clone, Copy)]
    pub struct TransmissionData {
        pub x: i32,
        pub y: i32,
        pub funky: f64,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let service_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "My/Funk/ServiceName".to_string());

    let config = ServiceConfig::new(4, 4)
        .with_history_size(HISTORY_SIZE)
        .with_subscriber_max_buffer_size(HISTORY_SIZE);

    let node = Node::new();
    let service = Service::<TransmissionData>::open_or_create(&service_name, &config)?;
    let publisher = service.create_publisher()?;

    println!("[Publisher] Service '{}' ({} slots)", service.name(), service.pool_size());

    let mut counter: i32 = 0;
    while let Ok(NodeEvent::Tick) = node.wait(CYCLE_TIME) {
        let sample = publisher.loan_uninit()?.write_payload(TransmissionData {
            x: counter,
            y: counter * 3,
            funky: counter as f64 * 812.12,
        });

        match sample.send() {
            Ok(subscribers) => {
                println!("[Publisher] Sent {} to {} subscribers", counter, subscribers)
            }
            Err(SendError::ConnectionBroken) => {
                println!("[Publisher] Sample {} not delivered", counter)
            }
        }
        counter += 1;
    }

    println!("[Publisher] Exit");
    Ok(())
}
