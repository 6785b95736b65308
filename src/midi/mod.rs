pub mod manager;

pub use manager::{list_port_names, list_ports, MidiManager};
