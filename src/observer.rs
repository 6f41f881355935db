//! sd-mmc-card - Observers
//!
//! Numeric and text sinks that get told about the card. The card only holds
//! weak references, so a sink that goes away is quietly skipped.

use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

#[cfg(feature = "log")]
use log::{trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{trace, warn};

use crate::config::{ConfigError, ObserverKind, SensorType, TextSensorType};
use crate::host::SdMmcHost;
use crate::path::SdPath;
use crate::session::{CardSession, Usage};

/// Something that takes numeric readings. `None` means unavailable.
pub trait Sensor {
    fn publish_state(&mut self, state: Option<u64>);
}

/// Something that takes text readings. `None` means unavailable.
pub trait TextSensor {
    fn publish_state(&mut self, state: Option<&str>);
}

#[derive(Clone)]
enum Sink {
    Numeric(Weak<RefCell<dyn Sensor>>),
    Text(Weak<RefCell<dyn TextSensor>>),
}

/// One metric of the card, pushed into one sink.
#[derive(Clone)]
pub struct ObserverBinding {
    kind: ObserverKind,
    path: Option<SdPath>,
    sink: Sink,
}

impl ObserverBinding {
    pub fn sensor<S>(sensor_type: SensorType, sink: &Rc<RefCell<S>>) -> Self
    where
        S: Sensor + 'static,
    {
        let sink: Rc<RefCell<dyn Sensor>> = sink.clone();
        ObserverBinding {
            kind: sensor_type.into(),
            path: None,
            sink: Sink::Numeric(Rc::downgrade(&sink)),
        }
    }

    pub fn text_sensor<S>(sensor_type: TextSensorType, sink: &Rc<RefCell<S>>) -> Self
    where
        S: TextSensor + 'static,
    {
        let sink: Rc<RefCell<dyn TextSensor>> = sink.clone();
        ObserverBinding {
            kind: sensor_type.into(),
            path: None,
            sink: Sink::Text(Rc::downgrade(&sink)),
        }
    }

    /// Watch a file on the card.
    pub fn with_path(mut self, path: &str) -> Result<Self, ConfigError> {
        self.path = Some(SdPath::new(path).map_err(ConfigError::InvalidPath)?);
        Ok(self)
    }

    pub fn kind(&self) -> ObserverKind {
        self.kind
    }

    pub fn path(&self) -> Option<&SdPath> {
        self.path.as_ref()
    }

    /// Whether the sink is still around.
    pub fn is_alive(&self) -> bool {
        match &self.sink {
            Sink::Numeric(weak) => weak.strong_count() > 0,
            Sink::Text(weak) => weak.strong_count() > 0,
        }
    }

    fn number<H>(&self, session: &mut CardSession<H>, usage: Option<Usage>) -> Option<u64>
    where
        H: SdMmcHost,
    {
        if !session.is_mounted() {
            return None;
        }
        match self.kind {
            ObserverKind::TotalSpace => usage.map(|u| u.total),
            ObserverKind::UsedSpace => usage.map(|u| u.used),
            ObserverKind::FreeSpace => usage.map(|u| u.free),
            ObserverKind::Frequency => Some(u64::from(session.frequency_khz())),
            ObserverKind::FileSize => {
                let path = self.path.as_ref()?;
                session.file_size(path.as_str()).ok()
            }
            ObserverKind::CardType | ObserverKind::FileContent | ObserverKind::FsType => None,
        }
    }

    fn text<H>(&self, session: &mut CardSession<H>) -> Option<String>
    where
        H: SdMmcHost,
    {
        if !session.is_mounted() {
            return None;
        }
        match self.kind {
            ObserverKind::CardType => Some(String::from(session.card_type().label())),
            ObserverKind::FsType => Some(String::from(session.fs_type().label())),
            ObserverKind::FileContent => {
                let path = self.path.as_ref()?;
                let data = session.read(path.as_str()).ok()?;
                Some(String::from_utf8_lossy(&data).into_owned())
            }
            ObserverKind::TotalSpace
            | ObserverKind::UsedSpace
            | ObserverKind::FreeSpace
            | ObserverKind::Frequency
            | ObserverKind::FileSize => None,
        }
    }

    /// Work out the current value and hand it to the sink.
    pub fn push<H>(&self, session: &mut CardSession<H>, usage: Option<Usage>)
    where
        H: SdMmcHost,
    {
        match &self.sink {
            Sink::Numeric(weak) => {
                let sink = match weak.upgrade() {
                    Some(sink) => sink,
                    None => return,
                };
                let value = self.number(session, usage);
                let borrowed = sink.try_borrow_mut();
                match borrowed {
                    Ok(mut sink) => {
                        trace!("{}: {:?}", self.kind.key(), value);
                        sink.publish_state(value);
                    }
                    Err(_) => warn!("{} sensor busy, skipped", self.kind.key()),
                };
            }
            Sink::Text(weak) => {
                let sink = match weak.upgrade() {
                    Some(sink) => sink,
                    None => return,
                };
                let value = self.text(session);
                let borrowed = sink.try_borrow_mut();
                match borrowed {
                    Ok(mut sink) => {
                        trace!("{}: {:?}", self.kind.key(), value.as_deref());
                        sink.publish_state(value.as_deref());
                    }
                    Err(_) => warn!("{} text sensor busy, skipped", self.kind.key()),
                };
            }
        }
    }
}

/// The bindings of one card, in registration order.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    bindings: Vec<ObserverBinding>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding. File based kinds must carry a path; others drop theirs.
    pub fn register(&mut self, mut binding: ObserverBinding) -> Result<(), ConfigError> {
        if binding.kind.requires_path() {
            if binding.path.is_none() {
                return Err(ConfigError::MissingPath(binding.kind.key()));
            }
        } else if binding.path.take().is_some() {
            warn!("{} takes no path, ignoring it", binding.kind.key());
        }
        self.bindings.push(binding);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObserverBinding> {
        self.bindings.iter()
    }

    /// Push every binding, in order.
    pub fn publish<H>(&self, session: &mut CardSession<H>, usage: Option<Usage>)
    where
        H: SdMmcHost,
    {
        for binding in &self.bindings {
            binding.push(session, usage);
        }
    }

    /// Push only the bindings watching `path`.
    pub fn publish_path<H>(&self, session: &mut CardSession<H>, path: &SdPath)
    where
        H: SdMmcHost,
    {
        let usage = session.usage();
        for binding in self.bindings.iter().filter(|b| b.path.as_ref() == Some(path)) {
            binding.push(session, usage);
        }
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
