use sw6106_rs::data_types::{InterruptCategory, INTERRUPT_DESCRIPTIONS, STATUS_DESCRIPTIONS};
use sw6106_rs::registers::{addr, Interrupts, SystemStatus};

#[test]
fn status_flags_are_independent() {
    let status = SystemStatus::from_bits_truncate(0b0011_0100);
    assert!(status.is_charging());
    assert!(status.is_discharging());
    assert!(status.contains(SystemStatus::PORT_C_CONNECTED));
    assert!(!status.contains(SystemStatus::PORT_A_CONNECTED));
}

#[test]
fn status_display_lists_descriptions() {
    let status = SystemStatus::CHARGER_CONNECTED | SystemStatus::PORT_C_CONNECTED;
    assert_eq!(
        status.to_string(),
        "\tUSB type C port is connected\n\tCharger is connected"
    );
}

#[test]
fn empty_status_is_idle() {
    assert_eq!(SystemStatus::empty().to_string(), "\tIdle");
    // Reserved bit 3 is dropped on decode.
    assert_eq!(SystemStatus::from_bits_truncate(0x08).to_string(), "\tIdle");
}

#[test]
fn every_named_flag_is_described() {
    let described = STATUS_DESCRIPTIONS
        .iter()
        .fold(SystemStatus::empty(), |acc, (flag, _)| acc | *flag);
    assert_eq!(described, SystemStatus::all());

    let described = INTERRUPT_DESCRIPTIONS
        .iter()
        .fold(Interrupts::empty(), |acc, (flag, _)| acc | *flag);
    assert_eq!(described, Interrupts::all());
}

#[test]
fn interrupt_display_skips_reserved_bits() {
    let events = Interrupts::CHARGE_PERCENT_CHANGED
        | Interrupts::FULLY_CHARGED
        | Interrupts::from_bits_retain(1 << 2);
    assert_eq!(
        events.to_string(),
        "\tCharge percent changed\n\tBattery is fully charged"
    );
    assert_eq!(Interrupts::empty().to_string(), "");
}

#[test]
fn categories_follow_register_bytes() {
    for (index, category) in InterruptCategory::ALL.into_iter().enumerate() {
        let index = index as u8;
        assert_eq!(category.index(), index);
        assert_eq!(category.mask().bits(), 0xFFu32 << (8 * u32::from(index)));
        assert_eq!(category.global_enable_bit(), 1 << index);
        assert_eq!(category.latch_register(), addr::INT_FIRST + index);
        assert_eq!(category.mask_register(), addr::INT_MASK_FIRST + index);
    }
}

#[test]
fn flags_map_to_owning_category() {
    assert_eq!(
        InterruptCategory::of(Interrupts::SHORT_CIRCUIT),
        Some(InterruptCategory::Protection)
    );
    assert_eq!(
        InterruptCategory::of(Interrupts::SHORT_CONTROL_KEY_PRESS),
        Some(InterruptCategory::Ports)
    );
    // Bit 17 lives in the third latch register.
    assert_eq!(
        InterruptCategory::of(Interrupts::CHARGE_PERCENT_CHANGED),
        Some(InterruptCategory::PowerPath)
    );
    assert_eq!(
        InterruptCategory::of(Interrupts::WLED_STATE_CHANGED),
        Some(InterruptCategory::Indicators)
    );
    assert_eq!(InterruptCategory::of(Interrupts::empty()), None);
    assert_eq!(
        InterruptCategory::of(Interrupts::SHORT_CIRCUIT | Interrupts::FULLY_CHARGED),
        None
    );
}
