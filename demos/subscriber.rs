//! Example Subscriber
//!
//! Polls "My/Funk/ServiceName" once per cycle and prints every sample it
//! receives. The payload type is declared independently of `publisher`; the
//! overridden type name makes both declarations compatible.

use std::time::Duration;
use venom_pubsub::{relocatable, Node, NodeEvent, ReceiveError, Service, ServiceConfig};

const CYCLE_TIME: Duration = Duration::from_millis(500);

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

    let node = Node::new();
    let service = Service::<TransmissionData>::open_or_create(
        &service_name,
        &ServiceConfig::new(4, 4).with_subscriber_max_buffer_size(20).with_history_size(20),
    )?;
    let subscriber = service.create_subscriber()?;

    println!("[Subscriber] Listening on '{}' (Ctrl+C to quit)", service.name());

    while let Ok(NodeEvent::Tick) = node.wait(CYCLE_TIME) {
        loop {
            match subscriber.receive() {
                Ok(Some(sample)) => println!(
                    "[Subscriber] #{} from {}: {:?}",
                    sample.header().sequence_number,
                    sample.header().publisher_id,
                    *sample
                ),
                Ok(None) => break,
                Err(ReceiveError::ConnectionBroken { pending }) => {
                    println!("[Subscriber] Publishers left, {} samples pending", pending)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    println!("[Subscriber] Exit");
    Ok(())
}
