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

use bcm2835_timer::config::Config;
use bcm2835_timer::core::system::System;
use bcm2835_timer::core::timer::{registers, TYPE_BCM2835_TIMER};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_tick_dispatch(c: &mut Criterion) {
    c.bench_function("run 1ms of virtual time (125 ticks)", |b| {
        let mut system = System::new(Config::default());
        system
            .create_device(TYPE_BCM2835_TIMER, None)
            .expect("timer device");
        b.iter(|| black_box(system.run_for(1000)));
    });
}

fn bench_register_read(c: &mut Criterion) {
    c.bench_function("CLO read", |b| {
        let mut system = System::new(Config::default());
        let timer = system
            .create_device(TYPE_BCM2835_TIMER, None)
            .expect("timer device");
        b.iter(|| black_box(system.read(timer, registers::TIMER_CLO, 4)));
    });
}

criterion_group!(benches, bench_tick_dispatch, bench_register_read);
criterion_main!(benches);
