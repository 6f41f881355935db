use super::*;
use crate::bus::GpioCaps;
use crate::host::MemoryCard;

const MIB: u64 = 1024 * 1024;

fn four_bit() -> BusConfiguration {
    BusConfiguration::configure(
        &GpioCaps::ESP32,
        14,
        15,
        2,
        Some(4),
        Some(12),
        Some(13),
        false,
        None,
    )
    .unwrap()
}

fn session(card: &MemoryCard) -> CardSession<MemoryCard> {
    CardSession::new(card.clone(), MountOpts::default())
}

fn mounted(card: &MemoryCard) -> CardSession<MemoryCard> {
    let mut s = session(card);
    s.initialize(&four_bit(), None::<&mut NoPowerPin>).unwrap();
    s
}

struct PowerSwitch(MemoryCard);

impl OutputPin for PowerSwitch {
    type Error = core::convert::Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_powered(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_powered(true);
        Ok(())
    }
}

struct BrokenPin;

impl OutputPin for BrokenPin {
    type Error = ();

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(())
    }
}

#[test]
fn mount_reports_card() {
    let card = MemoryCard::new(MIB);
    let mut s = session(&card);
    assert_eq!(s.state(), MountState::Unmounted);

    let ready = s.initialize(&four_bit(), None::<&mut NoPowerPin>).unwrap();
    assert_eq!(
        ready,
        Ready {
            card_type: CardType::Sdhc,
            bus_width: BusWidth::FourBit,
            frequency_khz: 40_000,
        }
    );
    assert_eq!(s.state(), MountState::Mounted);
    assert_eq!(s.fs_type(), FsType::Fat32);
    assert_eq!(s.card_type().label(), "SDHC");
    assert!(s.card_capacity_bytes().unwrap() > 7 * 1024 * MIB);
    assert_eq!(
        s.usage(),
        Some(Usage {
            total: MIB,
            used: 0,
            free: MIB
        })
    );
}

#[test]
fn initialize_twice_mounts_once() {
    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    s.initialize(&four_bit(), None::<&mut NoPowerPin>).unwrap();
    assert_eq!(card.mount_count(), 1);
}

#[test]
fn power_before_handshake() {
    let card = MemoryCard::new(MIB).behind_power_switch();
    let mut pin = PowerSwitch(card.clone());
    let mut s = session(&card);
    s.initialize(&four_bit(), Some(&mut pin)).unwrap();
    assert!(card.powered());
    assert_eq!(card.mount_count(), 1);

    // without the pin the switched card never answers
    let card = MemoryCard::new(MIB).behind_power_switch();
    let mut s = session(&card);
    assert_eq!(
        s.initialize(&four_bit(), None::<&mut NoPowerPin>),
        Err(MountError::CardAbsent)
    );

    let card = MemoryCard::new(MIB).behind_power_switch();
    let mut s = session(&card);
    assert_eq!(
        s.initialize(&four_bit(), Some(&mut BrokenPin)),
        Err(MountError::PowerControl)
    );
    assert_eq!(card.mount_count(), 0);
}

#[test]
fn no_card_is_terminal() {
    let card = MemoryCard::new(MIB);
    card.eject();
    let mut s = session(&card);
    assert_eq!(
        s.initialize(&four_bit(), None::<&mut NoPowerPin>),
        Err(MountError::CardAbsent)
    );
    assert_eq!(s.state(), MountState::Failed);

    // stays failed, even once the card is back
    card.insert();
    assert_eq!(
        s.initialize(&four_bit(), None::<&mut NoPowerPin>),
        Err(MountError::CardAbsent)
    );
    assert_eq!(card.mount_count(), 0);
    assert_eq!(s.read("/a.txt"), Err(IoError::NotMounted));
    assert_eq!(s.refresh(), Err(MountError::NotMounted));
}

#[test]
fn unformatted_card() {
    let card = MemoryCard::new(MIB).unformatted();
    assert_eq!(
        session(&card).initialize(&four_bit(), None::<&mut NoPowerPin>),
        Err(MountError::NoFilesystem)
    );

    let card = MemoryCard::new(MIB).unformatted();
    let opts = MountOpts {
        format_if_mount_failed: true,
        ..Default::default()
    };
    let mut s = CardSession::new(card.clone(), opts);
    assert!(s.initialize(&four_bit(), None::<&mut NoPowerPin>).is_ok());
    let usage = s.usage().unwrap();
    assert_eq!(usage.total, MIB);
}

#[test]
fn narrow_slot() {
    let card = MemoryCard::new(MIB).one_bit_slot();
    let ready = session(&card)
        .initialize(&four_bit(), None::<&mut NoPowerPin>)
        .unwrap();
    assert_eq!(ready.bus_width, BusWidth::OneBit);
}

#[test]
fn nothing_before_mount() {
    let card = MemoryCard::new(MIB);
    let mut s = session(&card);
    assert_eq!(s.read("/a.txt"), Err(IoError::NotMounted));
    assert_eq!(s.write("/a.txt", b"x", false), Err(IoError::NotMounted));
    assert_eq!(s.remove("/a.txt"), Err(IoError::NotMounted));
    assert_eq!(s.make_directory("/d"), Err(IoError::NotMounted));
    assert_eq!(s.remove_directory("/d"), Err(IoError::NotMounted));
    assert_eq!(s.file_size("/a.txt"), Err(IoError::NotMounted));
    assert_eq!(s.list_directory("/", 1), Err(IoError::NotMounted));
    assert!(!s.is_directory("/"));
    assert_eq!(s.unmount(), Err(MountError::NotMounted));
    assert_eq!(s.card_type(), CardType::Unknown);
    assert_eq!(s.frequency_khz(), 0);
    assert!(!card.contains("/a.txt"));
}

#[test]
fn write_read_append() {
    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    s.write("/log.txt", b"hello", false).unwrap();
    assert_eq!(s.read("/log.txt").unwrap(), b"hello");
    s.write("/log.txt", b" world", true).unwrap();
    assert_eq!(s.read("/log.txt").unwrap(), b"hello world");
    assert_eq!(s.file_size("/log.txt"), Ok(11));
    s.write("/log.txt", b"bye", false).unwrap();
    assert_eq!(card.file("/log.txt").unwrap(), b"bye");

    // appending creates the file
    s.write("new.txt", b"n", true).unwrap();
    assert_eq!(s.read("/new.txt").unwrap(), b"n");

    s.write("/empty", b"", false).unwrap();
    assert_eq!(s.file_size("/empty"), Ok(0));
}

#[test]
fn usage_tracks_writes() {
    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    s.write("/a", &[0u8; 5000], false).unwrap();
    let usage = s.refresh().unwrap();
    assert_eq!(usage.used, 8192);
    assert_eq!(usage.used + usage.free, usage.total);
}

#[test]
fn io_errors() {
    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    s.make_directory("/logs").unwrap();
    s.write("/logs/a.txt", b"a", false).unwrap();

    assert_eq!(s.read("/missing.txt"), Err(IoError::NotFound));
    assert_eq!(s.read("/logs"), Err(IoError::NotAFile));
    assert_eq!(s.read("/"), Err(IoError::NotAFile));
    assert_eq!(s.read("/a*b"), Err(IoError::PathInvalid));
    assert_eq!(s.read("/../etc"), Err(IoError::PathInvalid));
    assert_eq!(s.write("/nodir/a.txt", b"x", false), Err(IoError::PathInvalid));
    assert_eq!(s.write("/logs", b"x", false), Err(IoError::PathInvalid));
    assert_eq!(s.write("/", b"x", false), Err(IoError::PathInvalid));
    assert_eq!(s.remove("/missing.txt"), Err(IoError::NotFound));
    assert_eq!(s.remove("/logs"), Err(IoError::NotAFile));
    assert_eq!(s.make_directory("/logs"), Err(IoError::AlreadyExists));
    assert_eq!(s.make_directory("/x/y"), Err(IoError::PathInvalid));
    assert_eq!(s.remove_directory("/logs"), Err(IoError::NotEmpty));
    assert_eq!(s.remove_directory("/nope"), Err(IoError::NotFound));
    assert_eq!(s.file_size("/logs"), Err(IoError::NotAFile));

    // a failed removal leaves everything in place
    assert_eq!(s.read("/logs/a.txt").unwrap(), b"a");
    assert!(s.is_directory("/logs"));
    assert!(!s.is_directory("/logs/a.txt"));

    s.remove("/logs/a.txt").unwrap();
    s.remove_directory("/logs").unwrap();
    assert!(!card.contains("/logs"));
}

#[test]
fn full_card() {
    let card = MemoryCard::new(64 * 1024);
    let mut s = mounted(&card);
    s.write("/big", &[0u8; 64 * 1024], false).unwrap();
    assert_eq!(s.write("/more", b"x", false), Err(IoError::WriteFailed));
    assert_eq!(s.state(), MountState::Mounted);
    assert_eq!(s.refresh().unwrap().free, 0);
}

#[test]
fn listing_depth() {
    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    s.make_directory("/a").unwrap();
    s.make_directory("/a/b").unwrap();
    s.write("/a/b/deep.txt", b"1234", false).unwrap();
    s.write("/top.txt", b"t", false).unwrap();

    assert!(s.list_directory("/", 0).unwrap().is_empty());

    let paths = |list: Vec<FileInfo>| -> Vec<String> {
        list.into_iter()
            .map(|info| String::from(info.path.as_str()))
            .collect()
    };
    assert_eq!(paths(s.list_directory("/", 1).unwrap()), ["/a", "/top.txt"]);
    assert_eq!(
        paths(s.list_directory("/", 3).unwrap()),
        ["/a", "/a/b", "/a/b/deep.txt", "/top.txt"]
    );

    let deep = s.list_directory("/a/b", 1).unwrap();
    assert_eq!(
        deep,
        [FileInfo {
            path: SdPath::new("/a/b/deep.txt").unwrap(),
            size: 4,
            is_directory: false,
        }]
    );
    assert_eq!(s.list_directory("/top.txt", 1), Err(IoError::PathInvalid));
    assert_eq!(s.list_directory("/nope", 1), Err(IoError::NotFound));
}

#[test]
fn card_pulled_while_mounted() {
    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    s.write("/a.txt", b"a", false).unwrap();
    card.eject();

    assert_eq!(s.write("/a.txt", b"b", false), Err(IoError::WriteFailed));
    assert_eq!(s.state(), MountState::Failed);
    assert_eq!(s.failure(), Some(MountError::CardLost));
    assert_eq!(s.usage(), None);
    assert_eq!(s.read("/a.txt"), Err(IoError::NotMounted));
    assert_eq!(s.fs_type(), FsType::Unknown);

    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    card.eject();
    assert_eq!(s.refresh(), Err(MountError::CardLost));
    assert_eq!(s.state(), MountState::Failed);
}

#[test]
fn unmount_remount_format() {
    let card = MemoryCard::new(MIB);
    let mut s = mounted(&card);
    s.write("/keep.txt", b"k", false).unwrap();

    s.remount().unwrap();
    assert_eq!(card.mount_count(), 2);
    assert_eq!(s.read("/keep.txt").unwrap(), b"k");

    s.format().unwrap();
    assert!(!card.contains("/keep.txt"));
    assert_eq!(s.usage().unwrap().total, MIB);

    s.unmount().unwrap();
    assert!(!card.is_mounted());
    assert_eq!(s.state(), MountState::Unmounted);
    assert_eq!(s.read("/keep.txt"), Err(IoError::NotMounted));
    assert_eq!(s.remount(), Err(MountError::NotMounted));

    s.initialize(&four_bit(), None::<&mut NoPowerPin>).unwrap();
    assert!(card.is_mounted());
}

#[test]
fn drop_unmounts() {
    let card = MemoryCard::new(MIB);
    {
        let _s = mounted(&card);
        assert!(card.is_mounted());
    }
    assert!(!card.is_mounted());
}
