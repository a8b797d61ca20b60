mod timer;

pub use self::timer::{Timer, TimerOperation, TimerOutput};

pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::app::DriverApp;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
#[effect(app = "DriverApp")]
pub struct Capabilities {
    pub http: Http<Event>,
    pub render: Render<Event>,
    pub timer: Timer<Event>,
}
