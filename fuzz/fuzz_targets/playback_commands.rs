#![no_main]

use libfuzzer_sys::fuzz_target;
use rhythm_slicer::audio::ScriptedBackend;
use rhythm_slicer::model::{PlayerState, RepeatMode, Track};
use rhythm_slicer::playlist::Playlist;
use rhythm_slicer::transport::{SeekTarget, TransportOptions, TransportStateMachine};
use rhythm_slicer::watchdog::Heartbeat;
use std::sync::Arc;
use std::time::Duration;

fuzz_target!(|data: &[u8]| {
    let Some((&first, commands)) = data.split_first() else {
        return;
    };
    let len = usize::from(first % 16);
    let (backend, script) = ScriptedBackend::new();
    script.set_duration(Some(Duration::from_secs(120)));
    let mut transport = TransportStateMachine::new(
        Box::new(backend),
        Playlist::new((0..len).map(|idx| Track::new(format!("track_{idx}.mp3"))).collect()),
        TransportOptions {
            skip_unplayable: first & 0x80 != 0,
            shuffle_seed: Some(u64::from(first)),
            ..TransportOptions::default()
        },
        Arc::new(Heartbeat::new()),
    );

    for pair in commands.chunks(2) {
        let op = pair[0];
        let arg = pair.get(1).copied().unwrap_or_default();
        let _ = match op % 16 {
            0 => transport.play(),
            1 => transport.pause(),
            2 => transport.stop(),
            3 => transport.next_track(),
            4 => transport.previous_track(),
            5 => transport.natural_end(),
            6 => transport.play_index(usize::from(arg)),
            7 => transport.seek(SeekTarget::Relative(f64::from(arg as i8))),
            8 => transport.set_volume(i32::from(arg as i8) * 2),
            9 => transport.set_speed(f32::from(arg) / 32.0),
            10 => {
                transport.set_repeat_mode(match arg % 3 {
                    0 => RepeatMode::Off,
                    1 => RepeatMode::One,
                    _ => RepeatMode::All,
                });
                Ok(())
            }
            11 => {
                transport.toggle_shuffle();
                Ok(())
            }
            12 => {
                transport.remove_track(usize::from(arg) % 20);
                Ok(())
            }
            13 => {
                transport.add_track(Track::new(format!("extra_{}.mp3", arg % 8)));
                Ok(())
            }
            14 => {
                script.fail_load(Track::new(format!("track_{}.mp3", arg % 16)).path);
                Ok(())
            }
            _ => {
                script.set_ended(arg & 1 == 1);
                transport.refresh();
                Ok(())
            }
        };

        let snapshot = transport.snapshot();
        let order_len = transport.order().len();
        assert_eq!(order_len, snapshot.playlist_len);
        let mut order = transport.order().order().to_vec();
        order.sort_unstable();
        assert!(order.iter().copied().eq(0..order_len));
        assert!(snapshot.volume <= 100);
        assert!((0.25..=3.0).contains(&snapshot.speed));
        if let Some(current) = snapshot.current_index {
            assert!(current < snapshot.playlist_len);
        }
        if snapshot.state == PlayerState::Stopped {
            assert_eq!(snapshot.position, Duration::ZERO);
        }
    }
});
