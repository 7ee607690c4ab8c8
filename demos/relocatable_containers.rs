//! Relocatable Containers
//!
//! Publishes and receives a payload built from nested `StaticString` and
//! `StaticVector` fields in the same process, once per second.

use std::time::Duration;
use venom_pubsub::{relocatable, Node, NodeEvent, Service, ServiceConfig, StaticString, StaticVector};

const CYCLE_TIME: Duration = Duration::from_secs(1);

relocatable! {
    #[derive(Debug, Clone)]
    struct ComplexData {
        name: StaticString<4>,
        data: StaticVector<u64, 4>,
    }
}

relocatable! {
    #[derive(Debug)]
    struct ComplexDataType {
        plain_old_data: u64,
        text: StaticString<8>,
        vec_of_data: StaticVector<u64, 4>,
        vec_of_complex_data: StaticVector<ComplexData, 4096>,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let node = Node::new();
    let service = Service::<ComplexDataType>::open_or_create(
        "My/Funk/ServiceName/Containers",
        &ServiceConfig::new(16, 16),
    )?;
    let publisher = service.create_publisher()?;
    let subscriber = service.create_subscriber()?;

    let mut counter: u64 = 0;
    while let Ok(NodeEvent::Tick) = node.wait(CYCLE_TIME) {
        counter += 1;

        let mut sample = publisher.loan_uninit()?;
        // Loaned memory is zeroed, and all-zero bytes are a valid empty
        // ComplexDataType: fill it in place instead of building it on the stack
        let payload = unsafe { &mut *sample.payload_mut().as_mut_ptr() };
        payload.plain_old_data = counter;
        payload.text.assign("hello")?;
        payload.vec_of_data.try_push_back(counter)?;
        payload.vec_of_complex_data.try_push_back(ComplexData {
            name: StaticString::from_utf8(b"bla")?,
            data: StaticVector::try_from_value(2, counter)?,
        })?;

        let sample = unsafe { sample.assume_init() };
        sample.send()?;
        println!("{} :: send", counter);

        while let Some(sample) = subscriber.receive()? {
            println!("received: {}", sample.text);
        }
    }

    println!("exit");
    Ok(())
}
