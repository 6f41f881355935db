use std::{cell::RefCell, rc::Rc};

use sd_mmc_card::{
    CardHandle, CardType, ConfigError, FsAction, FsType, GpioCaps, Instances, IoError,
    MemoryCard, MountError, MountState, SdMmcCard, SdMmcConfig, SdMmcDevice, Sensor,
    SensorConfig, SensorType, Templatable, TextSensor, TextSensorConfig, TextSensorType,
};

#[derive(Default)]
struct Gauge(Vec<Option<u64>>);

impl Sensor for Gauge {
    fn publish_state(&mut self, state: Option<u64>) {
        self.0.push(state);
    }
}

#[derive(Default)]
struct Label(Vec<Option<String>>);

impl TextSensor for Label {
    fn publish_state(&mut self, state: Option<&str>) {
        self.0.push(state.map(String::from));
    }
}

#[test]
fn data_logger() {
    let _ = env_logger::builder().is_test(true).try_init();

    let memory = MemoryCard::new(8 * 1024 * 1024);
    let config = SdMmcConfig {
        update_interval_ms: 1_000,
        sensors: vec![
            SensorConfig::new(SensorType::UsedSpace),
            SensorConfig::new(SensorType::FileSize).with_path("/log/data.csv"),
        ],
        text_sensors: vec![
            TextSensorConfig::new(TextSensorType::CardType),
            TextSensorConfig::new(TextSensorType::FileContent).with_path("/log/data.csv"),
        ],
        ..Default::default()
    };

    let mut card = SdMmcCard::from_config(&config, &GpioCaps::ESP32, memory.clone()).unwrap();
    // sensors in the config only count once bound to a sink
    assert!(card.observers().is_empty());
    let ready = card.setup().unwrap();
    assert_eq!(ready.card_type, CardType::Sdhc);
    assert_eq!(card.session().fs_type(), FsType::Fat32);
    let card: CardHandle = Rc::new(RefCell::new(card));

    let mut instances = Instances::new();
    instances.declare("sd_card", card.clone()).unwrap();

    let used = Rc::new(RefCell::new(Gauge::default()));
    let size = Rc::new(RefCell::new(Gauge::default()));
    instances.bind_sensor(&config.sensors[0], &used).unwrap();
    instances.bind_sensor(&config.sensors[1], &size).unwrap();
    let card_type = Rc::new(RefCell::new(Label::default()));
    let content = Rc::new(RefCell::new(Label::default()));
    instances
        .bind_text_sensor(&config.text_sensors[0], &card_type)
        .unwrap();
    instances
        .bind_text_sensor(&config.text_sensors[1], &content)
        .unwrap();

    let mkdir = FsAction::create_directory(instances.get(None).unwrap(), "/log").unwrap();
    let next = Rc::new(RefCell::new(0u32));
    let append = instances
        .action(
            None,
            Templatable::from("/log/data.csv"),
            sd_mmc_card::FsOperation::AppendFile(Templatable::lambda(move || {
                *next.borrow_mut() += 1;
                format!("{}\n", next.borrow()).into_bytes()
            })),
        )
        .unwrap();

    mkdir.play().unwrap();
    append.play().unwrap();
    append.play().unwrap();
    card.borrow_mut().update_sensors();

    assert_eq!(memory.file("/log/data.csv").unwrap(), b"1\n2\n");
    assert_eq!(*size.borrow().0.last().unwrap(), Some(4));
    assert_eq!(
        content.borrow().0.last().unwrap().as_deref(),
        Some("1\n2\n")
    );
    assert_eq!(card_type.borrow().0, [Some(String::from("SDHC"))]);
    assert_eq!(*used.borrow().0.last().unwrap(), Some(2 * 4096));

    let listing = card.borrow_mut().list_directory("/", 2).unwrap();
    assert_eq!(listing.len(), 2);
    assert!(listing[0].is_directory);
    assert_eq!(listing[1].path.as_str(), "/log/data.csv");

    // the directory can't go while the log is in it
    let rmdir =
        FsAction::remove_directory(instances.get(Some("sd_card")).unwrap(), "/log").unwrap();
    assert_eq!(rmdir.play(), Err(IoError::NotEmpty));
    FsAction::delete_file(card.clone(), "/log/data.csv")
        .unwrap()
        .play()
        .unwrap();
    assert_eq!(*size.borrow().0.last().unwrap(), None);
    rmdir.play().unwrap();

    memory.eject();
    assert_eq!(append.play(), Err(IoError::WriteFailed));
    assert_eq!(card.borrow().state(), MountState::Failed);
    assert_eq!(append.play(), Err(IoError::NotMounted));
}

#[test]
fn bad_configuration() {
    let config = SdMmcConfig {
        clk_pin: 34,
        ..Default::default()
    };
    assert!(matches!(
        SdMmcCard::from_config(&config, &GpioCaps::ESP32, MemoryCard::new(1 << 20)),
        Err(ConfigError::InvalidPin { pin: 34, .. })
    ));

    let instances = Instances::new();
    let free = Rc::new(RefCell::new(Gauge::default()));
    assert_eq!(
        instances.bind_sensor(&SensorConfig::new(SensorType::FreeSpace), &free),
        Err(ConfigError::Unresolved)
    );
    assert!(matches!(
        instances.action(None, Templatable::from("/x"), sd_mmc_card::FsOperation::DeleteFile),
        Err(ConfigError::Unresolved)
    ));
}

#[test]
fn no_card_in_slot() {
    let memory = MemoryCard::new(1 << 20);
    memory.eject();
    let mut card = SdMmcCard::new(
        SdMmcConfig::default()
            .bus_configuration(&GpioCaps::ESP32)
            .unwrap(),
        memory,
    );
    let free = Rc::new(RefCell::new(Gauge::default()));
    card.register_free_space_sensor(&free).unwrap();
    assert_eq!(card.setup(), Err(MountError::CardAbsent));
    assert_eq!(card.setup(), Err(MountError::CardAbsent));
    assert_eq!(free.borrow().0, [None, None]);
    assert_eq!(card.read("/a"), Err(IoError::NotMounted));
}
