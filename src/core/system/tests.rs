// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::*;
use crate::core::interrupt::lines;
use crate::core::timer::registers::{TIMER_C0, TIMER_C2, TIMER_CHI, TIMER_CLO, TIMER_CS};
use crate::core::timer::TYPE_BCM2835_TIMER;

fn system_at(start_us: u64) -> System {
    let mut config = Config::default();
    config.simulation.start_time_us = start_us;
    System::new(config)
}

#[test]
fn test_create_timer_device() {
    let mut system = system_at(1000);
    let id = system
        .create_device(TYPE_BCM2835_TIMER, Some(lines::SYSTIMER_M1))
        .unwrap();

    assert_eq!(id, 0);
    assert_eq!(system.read(id, TIMER_CLO, 4).unwrap(), 1000);
    assert_eq!(system.read(id, TIMER_CHI, 4).unwrap(), 0);
    assert_eq!(system.timing().pending_count(), 1);
    assert_eq!(system.device(id).unwrap().type_name(), TYPE_BCM2835_TIMER);
}

#[test]
fn test_unknown_device_type() {
    let mut system = system_at(0);
    assert!(matches!(
        system.create_device("bcm2835-pl011", None),
        Err(EmulatorError::UnknownDeviceType(_))
    ));
    assert!(system.device_ids().is_empty());
}

#[test]
fn test_invalid_irq_line() {
    let mut system = system_at(0);
    assert!(matches!(
        system.create_device(TYPE_BCM2835_TIMER, Some(99)),
        Err(EmulatorError::InvalidIrqLine { line: 99 })
    ));
    assert_eq!(system.timing().pending_count(), 0);
}

#[test]
fn test_unknown_device_id() {
    let mut system = system_at(0);
    assert!(matches!(
        system.read(3, TIMER_CS, 4),
        Err(EmulatorError::UnknownDevice(3))
    ));
    assert!(matches!(
        system.write(3, TIMER_CS, 4, 1),
        Err(EmulatorError::UnknownDevice(3))
    ));
}

#[test]
fn test_run_for_advances_counter() {
    let mut system = system_at(1000);
    let id = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();

    let dispatched = system.run_for(8);
    assert_eq!(dispatched, 1);
    assert_eq!(system.now_us(), 1008);
    assert_eq!(system.read(id, TIMER_CLO, 4).unwrap(), 1008);

    system.run_for(100);
    assert_eq!(system.now_us(), 1108);
    assert_eq!(system.read(id, TIMER_CLO, 4).unwrap(), 1104);
}

#[test]
fn test_run_until_past_target_dispatches_nothing() {
    let mut system = system_at(500);
    system.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    assert_eq!(system.run_until(100), 0);
    assert_eq!(system.now_us(), 500);
}

#[test]
fn test_run_for_stops_at_end_of_clock() {
    let mut system = system_at(u64::MAX - 4);
    let id = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();

    assert_eq!(system.run_for(100), 0);
    assert_eq!(system.now_us(), u64::MAX);
    assert_eq!(system.timing().pending_count(), 0);
    assert_eq!(system.read(id, TIMER_CLO, 4).unwrap(), (u64::MAX - 4) & 0xffff_ffff);

    // Further runs return immediately
    assert_eq!(system.run_for(u64::MAX), 0);
}

#[test]
fn test_run_until_end_of_clock_terminates() {
    let mut system = system_at(u64::MAX - 100);
    let id = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();

    // Ticks at -92, -84, ..., -4; -100 + 8 * 13 passes the end
    assert_eq!(system.run_until(u64::MAX), 12);
    assert_eq!(system.read(id, TIMER_CLO, 4).unwrap(), (u64::MAX - 4) & 0xffff_ffff);
    assert_eq!(system.timing().pending_count(), 0);
}

#[test]
fn test_two_timers_tick_independently() {
    let mut system = system_at(0);
    let a = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    system.run_for(4);
    let b = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();

    system.run_until(19);

    // a ticks at 8, 16; b at 12
    assert_eq!(system.read(a, TIMER_CLO, 4).unwrap(), 16);
    assert_eq!(system.read(b, TIMER_CLO, 4).unwrap(), 12);
    assert_eq!(system.timing().pending_count(), 2);
}

#[test]
fn test_remove_device_cancels_tick() {
    let mut system = system_at(0);
    let a = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    let b = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();

    system.remove_device(a).unwrap();

    assert_eq!(system.timing().pending_count(), 1);
    assert_eq!(system.device_ids(), vec![b]);
    assert!(matches!(
        system.read(a, TIMER_CLO, 4),
        Err(EmulatorError::UnknownDevice(_))
    ));
    assert!(matches!(
        system.remove_device(a),
        Err(EmulatorError::UnknownDevice(_))
    ));

    // Ids are not reused
    let c = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    assert_eq!(c, 2);
}

#[test]
fn test_timer_never_raises_interrupt() {
    let mut system = system_at(0);
    let id = system
        .create_device(TYPE_BCM2835_TIMER, Some(lines::SYSTIMER_M3))
        .unwrap();
    system.interrupt_controller().borrow_mut().write_mask(!0);
    system.write(id, TIMER_C0, 4, 40).unwrap();

    system.run_for(100);

    assert!(!system.interrupt_controller().borrow().is_pending());
}

#[test]
fn test_snapshot_roundtrip_between_systems() {
    let mut src = system_at(2000);
    let id = src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    src.write(id, TIMER_C2, 4, 0xBEEF).unwrap();
    src.write(id, TIMER_CS, 4, 0x1).unwrap();
    let snapshot = src.save_snapshot().unwrap();
    assert_eq!(snapshot.clock_us, 2000);

    let bytes = snapshot.to_bytes().unwrap();
    let decoded = MachineSnapshot::from_bytes(&bytes).unwrap();

    let mut dst = system_at(0);
    let dst_id = dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    dst.restore_snapshot(&decoded).unwrap();

    assert_eq!(dst.now_us(), 2000);
    assert_eq!(dst.read(dst_id, TIMER_C2, 4).unwrap(), 0xBEEF);
    assert_eq!(dst.read(dst_id, TIMER_CS, 4).unwrap(), 0x1);
    assert_eq!(dst.read(dst_id, TIMER_CLO, 4).unwrap(), 2000);

    // The pending tick is overdue and fires on the next run
    dst.run_for(0);
    assert_eq!(dst.read(dst_id, TIMER_CLO, 4).unwrap(), 2000);
    dst.run_for(8);
    assert_eq!(dst.read(dst_id, TIMER_CLO, 4).unwrap(), 2008);
}

#[test]
fn test_restore_rejects_layout_mismatch() {
    let mut src = system_at(0);
    src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    let snapshot = src.save_snapshot().unwrap();

    let mut dst = system_at(0);
    let id = dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    dst.write(id, TIMER_C0, 4, 7).unwrap();

    assert!(matches!(
        dst.restore_snapshot(&snapshot),
        Err(EmulatorError::SnapshotLayout(_))
    ));
    assert_eq!(dst.read(id, TIMER_C0, 4).unwrap(), 7);
}

#[test]
fn test_restore_with_bad_section_changes_nothing() {
    let mut src = system_at(5000);
    let a = src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    src.write(a, TIMER_C0, 4, 0xAAAA).unwrap();
    let mut snapshot = src.save_snapshot().unwrap();
    if let Some(section) = snapshot.devices[1].as_mut() {
        section.data.truncate(3);
    }

    let mut dst = system_at(0);
    let x = dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    let y = dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    dst.write(x, TIMER_C0, 4, 7).unwrap();
    dst.write(y, TIMER_C0, 4, 9).unwrap();

    assert!(matches!(
        dst.restore_snapshot(&snapshot),
        Err(EmulatorError::SnapshotDecode(_))
    ));
    assert_eq!(dst.read(x, TIMER_C0, 4).unwrap(), 7);
    assert_eq!(dst.read(x, TIMER_CLO, 4).unwrap(), 0);
    assert_eq!(dst.read(y, TIMER_C0, 4).unwrap(), 9);
    assert_eq!(dst.now_us(), 0);
}

#[test]
fn test_restore_with_foreign_section_changes_nothing() {
    let mut src = system_at(300);
    src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    let mut snapshot = src.save_snapshot().unwrap();
    if let Some(section) = snapshot.devices[1].as_mut() {
        section.name = "bcm2835-pl011".to_string();
    }

    let mut dst = system_at(0);
    let x = dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    dst.write(x, TIMER_CS, 4, 0x5).unwrap();

    assert!(matches!(
        dst.restore_snapshot(&snapshot),
        Err(EmulatorError::SnapshotMismatch { .. })
    ));
    assert_eq!(dst.read(x, TIMER_CS, 4).unwrap(), 0x5);
    assert_eq!(dst.now_us(), 0);
}

#[test]
fn test_restore_rejects_removed_slot_mismatch() {
    let mut src = system_at(0);
    let a = src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    src.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    src.remove_device(a).unwrap();
    let snapshot = src.save_snapshot().unwrap();
    assert_eq!(snapshot.devices[0], None);

    let mut dst = system_at(0);
    dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    dst.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    assert!(matches!(
        dst.restore_snapshot(&snapshot),
        Err(EmulatorError::SnapshotLayout(_))
    ));
}

#[test]
fn test_register_dump() {
    let mut system = system_at(64);
    let id = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();
    let dump = system.register_dump(id).unwrap();
    assert_eq!(dump.len(), 7);
    assert_eq!(dump[1], ("CLO", 64));
}
