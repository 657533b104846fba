// ABOUTME: Counters published through the metrics facade.
// ABOUTME: The embedding binary decides which exporter, if any, receives them.

use metrics::counter;

pub fn listener_item() {
    counter!("shelly_listener_items_total").increment(1);
}

pub fn listener_error() {
    counter!("shelly_listener_errors_total").increment(1);
}

pub fn speaker_item() {
    counter!("shelly_speaker_items_total").increment(1);
}

pub fn speaker_error() {
    counter!("shelly_speaker_errors_total").increment(1);
}

pub fn command_handled(verb: &str) {
    counter!("shelly_commands_total", "verb" => verb.to_string()).increment(1);
}

pub fn work_item() {
    counter!("shelly_work_items_total").increment(1);
}
