use crossbeam_channel::Sender;

use crate::course::Course;
use crate::error::{WatchError, WatchResult};

use super::Notifier;

/// Forwards each batch over a channel, e.g. to a GUI or push bridge.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<Vec<Course>>,
}

impl ChannelNotifier {
    #[must_use]
    pub const fn new(tx: Sender<Vec<Course>>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&mut self, courses: &[Course]) -> WatchResult<()> {
        self.tx
            .send(courses.to_vec())
            .map_err(|_| WatchError::subscriber("notification receiver dropped"))
    }
}
