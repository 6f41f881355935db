//! sd-mmc-card - Filesystem actions
//!
//! Triggerable write / append / delete / mkdir / rmdir operations. Each
//! trigger runs once: no retries, and a failure is logged and returned, never
//! raised.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

#[cfg(feature = "log")]
use log::{debug, error};

#[cfg(feature = "defmt-log")]
use defmt::{debug, error};

use crate::config::ConfigError;
use crate::instance::CardHandle;
use crate::path::SdPath;
use crate::session::IoError;

/// A value known at setup time, or computed each time it is needed.
pub enum Templatable<T> {
    Static(T),
    Lambda(Box<dyn Fn() -> T>),
}

impl<T> Templatable<T>
where
    T: Clone,
{
    pub fn lambda<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Templatable::Lambda(Box::new(f))
    }

    pub fn value(&self) -> T {
        match self {
            Templatable::Static(value) => value.clone(),
            Templatable::Lambda(f) => f(),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Templatable::Static(_))
    }
}

impl<T> fmt::Debug for Templatable<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Templatable::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Templatable::Lambda(_) => f.write_str("Lambda"),
        }
    }
}

impl From<&str> for Templatable<String> {
    fn from(value: &str) -> Self {
        Templatable::Static(String::from(value))
    }
}

impl From<String> for Templatable<String> {
    fn from(value: String) -> Self {
        Templatable::Static(value)
    }
}

impl From<&[u8]> for Templatable<Vec<u8>> {
    fn from(value: &[u8]) -> Self {
        Templatable::Static(value.to_vec())
    }
}

impl From<Vec<u8>> for Templatable<Vec<u8>> {
    fn from(value: Vec<u8>) -> Self {
        Templatable::Static(value)
    }
}

impl From<&str> for Templatable<Vec<u8>> {
    fn from(value: &str) -> Self {
        Templatable::Static(value.as_bytes().to_vec())
    }
}

/// What an action does to its path.
#[derive(Debug)]
pub enum FsOperation {
    WriteFile(Templatable<Vec<u8>>),
    AppendFile(Templatable<Vec<u8>>),
    DeleteFile,
    CreateDirectory,
    RemoveDirectory,
}

impl FsOperation {
    /// The configuration key of this action.
    pub fn key(&self) -> &'static str {
        match self {
            FsOperation::WriteFile(_) => "write_file",
            FsOperation::AppendFile(_) => "append_file",
            FsOperation::DeleteFile => "delete_file",
            FsOperation::CreateDirectory => "create_directory",
            FsOperation::RemoveDirectory => "remove_directory",
        }
    }
}

/// One filesystem action bound to one card.
pub struct FsAction {
    card: CardHandle,
    path: Templatable<String>,
    op: FsOperation,
}

impl FsAction {
    /// A static path is checked here; a computed one when the action runs.
    pub fn new(
        card: CardHandle,
        path: Templatable<String>,
        op: FsOperation,
    ) -> Result<FsAction, ConfigError> {
        if let Templatable::Static(path) = &path {
            if path.is_empty() {
                return Err(ConfigError::MissingPath(op.key()));
            }
            SdPath::new(path).map_err(ConfigError::InvalidPath)?;
        }
        Ok(FsAction { card, path, op })
    }

    pub fn write_file<P, D>(card: CardHandle, path: P, data: D) -> Result<FsAction, ConfigError>
    where
        P: Into<Templatable<String>>,
        D: Into<Templatable<Vec<u8>>>,
    {
        Self::new(card, path.into(), FsOperation::WriteFile(data.into()))
    }

    pub fn append_file<P, D>(card: CardHandle, path: P, data: D) -> Result<FsAction, ConfigError>
    where
        P: Into<Templatable<String>>,
        D: Into<Templatable<Vec<u8>>>,
    {
        Self::new(card, path.into(), FsOperation::AppendFile(data.into()))
    }

    pub fn delete_file<P>(card: CardHandle, path: P) -> Result<FsAction, ConfigError>
    where
        P: Into<Templatable<String>>,
    {
        Self::new(card, path.into(), FsOperation::DeleteFile)
    }

    pub fn create_directory<P>(card: CardHandle, path: P) -> Result<FsAction, ConfigError>
    where
        P: Into<Templatable<String>>,
    {
        Self::new(card, path.into(), FsOperation::CreateDirectory)
    }

    pub fn remove_directory<P>(card: CardHandle, path: P) -> Result<FsAction, ConfigError>
    where
        P: Into<Templatable<String>>,
    {
        Self::new(card, path.into(), FsOperation::RemoveDirectory)
    }

    pub fn operation(&self) -> &FsOperation {
        &self.op
    }

    /// Run the action once.
    pub fn play(&self) -> Result<(), IoError> {
        let path = self.path.value();
        let mut card = match self.card.try_borrow_mut() {
            Ok(card) => card,
            Err(_) => {
                error!("{} {}: card busy", self.op.key(), path.as_str());
                return Err(IoError::WriteFailed);
            }
        };
        debug!("Running {} on {}", self.op.key(), path.as_str());
        let result = match &self.op {
            FsOperation::WriteFile(data) => card.write(&path, &data.value(), false),
            FsOperation::AppendFile(data) => card.write(&path, &data.value(), true),
            FsOperation::DeleteFile => card.remove(&path),
            FsOperation::CreateDirectory => card.make_directory(&path),
            FsOperation::RemoveDirectory => card.remove_directory(&path),
        };
        if let Err(e) = result {
            error!("{} {} failed: {:?}", self.op.key(), path.as_str(), e);
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bus::{BusConfiguration, GpioCaps};
    use crate::card::SdMmcCard;
    use crate::host::MemoryCard;
    use alloc::rc::Rc;
    use core::cell::{Cell, RefCell};

    fn setup() -> (CardHandle, MemoryCard) {
        let memory = MemoryCard::new(1024 * 1024);
        let bus =
            BusConfiguration::configure(&GpioCaps::ESP32, 14, 15, 2, None, None, None, true, None)
                .unwrap();
        let mut card = SdMmcCard::new(bus, memory.clone());
        card.setup().unwrap();
        let card: CardHandle = Rc::new(RefCell::new(card));
        (card, memory)
    }

    #[test]
    fn file_actions() {
        let (card, memory) = setup();
        let write = FsAction::write_file(card.clone(), "/log.txt", "first").unwrap();
        let append = FsAction::append_file(card.clone(), "/log.txt", &b" second"[..]).unwrap();
        let delete = FsAction::delete_file(card.clone(), "/log.txt").unwrap();

        write.play().unwrap();
        append.play().unwrap();
        assert_eq!(memory.file("/log.txt").unwrap(), b"first second");
        write.play().unwrap();
        assert_eq!(memory.file("/log.txt").unwrap(), b"first");
        delete.play().unwrap();
        assert!(!memory.contains("/log.txt"));
        assert_eq!(delete.play(), Err(IoError::NotFound));
    }

    #[test]
    fn directory_actions() {
        let (card, memory) = setup();
        let mkdir = FsAction::create_directory(card.clone(), "/data").unwrap();
        let rmdir = FsAction::remove_directory(card.clone(), "/data").unwrap();
        mkdir.play().unwrap();
        assert_eq!(mkdir.play(), Err(IoError::AlreadyExists));

        card.borrow_mut().write("/data/keep", b"k", false).unwrap();
        assert_eq!(rmdir.play(), Err(IoError::NotEmpty));
        assert_eq!(memory.file("/data/keep").unwrap(), b"k");

        card.borrow_mut().remove("/data/keep").unwrap();
        rmdir.play().unwrap();
        assert_eq!(rmdir.play(), Err(IoError::NotFound));
    }

    #[test]
    fn values_computed_on_trigger() {
        let (card, memory) = setup();
        let counter = Rc::new(Cell::new(0u32));
        let c = counter.clone();
        let path = Templatable::lambda(move || {
            c.set(c.get() + 1);
            alloc::format!("/run{}.txt", c.get())
        });
        let c = counter.clone();
        let data = Templatable::lambda(move || alloc::format!("{}", c.get()).into_bytes());
        let action = FsAction::new(card, path, FsOperation::WriteFile(data)).unwrap();

        action.play().unwrap();
        action.play().unwrap();
        assert_eq!(memory.file("/run1.txt").unwrap(), b"1");
        assert_eq!(memory.file("/run2.txt").unwrap(), b"2");
    }

    #[test]
    fn bad_paths() {
        let (card, _memory) = setup();
        assert_eq!(
            FsAction::delete_file(card.clone(), "").err(),
            Some(ConfigError::MissingPath("delete_file"))
        );
        assert!(FsAction::write_file(card.clone(), "/a:b", "x").is_err());

        let computed = FsAction::new(
            card,
            Templatable::lambda(|| String::from("/../up")),
            FsOperation::DeleteFile,
        )
        .unwrap();
        assert_eq!(computed.play(), Err(IoError::PathInvalid));
    }

    #[test]
    fn busy_card_fails_action() {
        let (card, memory) = setup();
        let write = FsAction::write_file(card.clone(), "/x", "x").unwrap();
        let _held = card.borrow_mut();
        assert_eq!(write.play(), Err(IoError::WriteFailed));
        assert!(!memory.contains("/x"));
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
