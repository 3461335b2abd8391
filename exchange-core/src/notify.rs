use serde::{Deserialize, Serialize};

use crate::{Assignment, Outcome, Participant, SpinMode};

/// State transitions pushed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Notification {
    CandidatesChanged {
        names: Vec<Participant>,
        mode: SpinMode,
    },
    SpinResolved {
        outcome: Outcome,
    },
    SelectionRequired {
        candidates: Vec<Participant>,
    },
    GameComplete {
        assignments: Vec<Assignment>,
    },
}

pub trait Observer {
    fn notify(&mut self, notification: &Notification);
}

impl Observer for () {
    fn notify(&mut self, _notification: &Notification) {}
}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn notify(&mut self, notification: &Notification) {
        (**self).notify(notification)
    }
}

/// Keeps every notification in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recorder {
    pub notifications: Vec<Notification>,
}

impl Recorder {
    pub fn take(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn last(&self) -> Option<&Notification> {
        self.notifications.last()
    }
}

impl Observer for Recorder {
    fn notify(&mut self, notification: &Notification) {
        self.notifications.push(notification.clone());
    }
}
