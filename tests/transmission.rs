//! Integration test: controller → memory channel → WAV → demodulated frame.

use std::sync::Arc;

use tc_engine::{burst_ranges, SampleBlock, ToneParams, CYCLES_PER_SYMBOL};
use tc_formats::{block_to_wav, load_wav};
use tc_ir::{Frame, FRAME_LEN};
use tc_master::{Controller, MemoryChannel, Setpoint, IGNORE_SPEED, PAUSE};

fn controller(params: ToneParams) -> (Controller, Arc<MemoryChannel>) {
    let channel = Arc::new(MemoryChannel::new(["Speakers", "USB Audio"]));
    (Controller::new(channel.clone(), params), channel)
}

/// Decide each symbol by the energy in its `4R` sample slot.
fn demodulate(samples: &[i16], params: &ToneParams) -> [Frame; 2] {
    let slot = CYCLES_PER_SYMBOL * params.samples_per_cycle();
    let threshold = params.amplitude() as u64 * slot as u64 / 4;

    burst_ranges(params).map(|range| {
        let burst = &samples[range];
        let mut symbols = [0u8; FRAME_LEN];
        for (i, symbol) in symbols.iter_mut().enumerate() {
            let energy: u64 = burst[i * slot..(i + 1) * slot]
                .iter()
                .map(|s| s.unsigned_abs() as u64)
                .sum();
            *symbol = u8::from(energy > threshold);
        }
        Frame::from_symbols(symbols).unwrap()
    })
}

fn assert_decodes(block: &SampleBlock, params: &ToneParams, speed: u8, incline: u8) {
    for frame in demodulate(block.samples(), params) {
        assert!(frame.has_valid_framing(), "bad framing: {}", frame);
        assert!(frame.has_valid_checksum(), "bad checksum: {}", frame);
        assert_eq!(frame.speed(), speed);
        assert_eq!(frame.incline(), incline);
        assert_eq!(frame.checksum(), speed.wrapping_add(incline));
    }
}

#[test]
fn played_chirp_demodulates_to_command() {
    let params = ToneParams::REFERENCE;
    let (ctrl, channel) = controller(params);

    ctrl.transmit(Setpoint::new(35, 20), 1).unwrap();

    let played = channel.played();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].device_index, 1);
    assert_eq!(played[0].block.len(), 8448);
    assert_decodes(&played[0].block, &params, 35, 20);
}

#[test]
fn wav_file_round_trips_through_demodulator() {
    let params = ToneParams::REFERENCE;
    let (ctrl, _) = controller(params);

    let wav = ctrl.render_to_wav(Setpoint::new(100, 120));
    let block = load_wav(&wav).unwrap();
    assert_eq!(block.sample_rate(), 44_100);
    assert_eq!(block, ctrl.render(Setpoint::new(100, 120)));
    assert_decodes(&block, &params, 100, 120);
}

#[test]
fn loaded_wav_plays_unchanged() {
    let (ctrl, channel) = controller(ToneParams::REFERENCE);
    let block = ctrl.render(Setpoint::new(50, 0));

    let loaded = load_wav(&block_to_wav(&block)).unwrap();
    ctrl.play_block(&loaded, -1).unwrap();

    let played = channel.played();
    assert_eq!(played[0].device_index, -1);
    assert_eq!(played[0].block, block);
}

#[test]
fn sentinels_survive_end_to_end() {
    let params = ToneParams::REFERENCE;
    let (ctrl, channel) = controller(params);

    ctrl.pause(45, 0).unwrap();

    let played = channel.played();
    assert_eq!(played.len(), 2);
    assert_decodes(&played[0].block, &params, IGNORE_SPEED, 45);
    assert_decodes(&played[1].block, &params, PAUSE, 45);
}

#[test]
fn other_sample_rates_demodulate() {
    for (sample_rate, frequency) in [(48_000, 2_000), (22_050, 2_000), (44_100, 1_000)] {
        let params = ToneParams::new(sample_rate, frequency, 20_000).unwrap();
        let (ctrl, _) = controller(params);
        let block = ctrl.render(Setpoint::new(73, 61));
        assert_eq!(block.sample_rate(), sample_rate);
        assert_eq!(block.len(), 384 * params.samples_per_cycle());
        assert_decodes(&block, &params, 73, 61);
    }
}

#[test]
fn dispatcher_delivers_latest_command() {
    let params = ToneParams::REFERENCE;
    let channel = Arc::new(MemoryChannel::new(["Speakers"]).realtime(true));
    let mut ctrl = Controller::new(channel.clone(), params);
    ctrl.start_dispatcher().unwrap();

    for speed in [30, 40, 50, 60] {
        ctrl.submit(Setpoint::new(speed, 10), 0).unwrap();
    }
    ctrl.dispatcher().unwrap().wait_idle();
    let stats = ctrl.stop_dispatcher().unwrap();

    let played = channel.played();
    assert_eq!(stats.submitted, 4);
    assert_eq!(stats.sent as usize, played.len());
    assert_eq!(stats.sent + stats.coalesced, 4);
    let last = played.last().unwrap();
    assert_decodes(&last.block, &params, 60, 10);
}

#[test]
fn fixed_rate_device_receives_decodable_chirp() {
    let channel = Arc::new(MemoryChannel::new(["USB Audio"]).supported_rates([48_000..=48_000]));
    let ctrl = Controller::new(channel.clone(), ToneParams::REFERENCE);

    ctrl.transmit(Setpoint::new(35, 20), 0).unwrap();

    let played = channel.played();
    assert_eq!(played.len(), 1);
    let block = &played[0].block;
    assert_eq!(block.sample_rate(), 48_000);
    let params_48k = ToneParams::REFERENCE.with_sample_rate(48_000).unwrap();
    assert_decodes(block, &params_48k, 35, 20);
}

#[test]
fn sweep_skips_hard_stop_end_to_end() {
    let params = ToneParams::REFERENCE;
    let (ctrl, channel) = controller(params);

    ctrl.sweep(250, 0, std::time::Duration::ZERO).unwrap();

    let sent: Vec<u8> = channel
        .played()
        .iter()
        .map(|p| demodulate(p.block.samples(), &params)[0].speed())
        .collect();
    assert_eq!(sent, vec![250, 251, 253, 254]);
}
