//! Unit tests for the params module

#[cfg(test)]
mod tests {
    use crate::constants::{FREQUENCY_MAX, FREQUENCY_MIN, PAN_CENTER, PAN_LEFT, PAN_RIGHT, VOLUME_MAX, VOLUME_MIN};
    use crate::format::FormatDescriptor;
    use crate::params::{
        cursor_for_offset, distinct_duplicate_volume, pan_to_db, pitch_to_frequency, volume_to_db,
        VirtualChannel,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_virtual_channel_default() {
        let params = VirtualChannel::default();

        assert_eq!(params.volume, 1.0);
        assert_eq!(params.pitch, 1.0);
        assert_eq!(params.pan, 0.0);
        assert_eq!(params.time_offset_secs, 0.0);
    }

    #[test]
    fn test_volume_to_db() {
        assert_eq!(volume_to_db(1.0), VOLUME_MAX);
        assert_eq!(volume_to_db(0.5), -602);
        assert!((-2000..=-1999).contains(&volume_to_db(0.1)));
        assert_eq!(volume_to_db(0.001), VOLUME_MIN);
        assert_eq!(volume_to_db(0.0), VOLUME_MIN);
        assert_eq!(volume_to_db(-1.0), VOLUME_MIN);
        // Gains above unity clamp to full volume
        assert_eq!(volume_to_db(4.0), VOLUME_MAX);
    }

    #[test]
    fn test_duplicate_volume_never_matches_original() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..10_000 {
            let original = rng.random_range(VOLUME_MIN..=VOLUME_MAX);
            let computed = if rng.random_bool(0.5) {
                original
            } else {
                rng.random_range(VOLUME_MIN..=VOLUME_MAX)
            };

            let volume = distinct_duplicate_volume(computed, original);

            assert_ne!(volume, original);
            assert!((VOLUME_MIN..=VOLUME_MAX).contains(&volume));
            if computed != original {
                assert_eq!(volume, computed);
            }
        }
    }

    #[test]
    fn test_duplicate_volume_direction() {
        // Toward full volume, or down from it when already there
        assert_eq!(distinct_duplicate_volume(-602, -602), -601);
        assert_eq!(distinct_duplicate_volume(VOLUME_MAX, VOLUME_MAX), VOLUME_MAX - 1);
        assert_eq!(distinct_duplicate_volume(VOLUME_MIN, VOLUME_MIN), VOLUME_MIN + 1);
    }

    #[test]
    fn test_pan_dead_zone_and_saturation() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..10_000 {
            let value: f32 = rng.random_range(-1.5..1.5);
            let pan = pan_to_db(value);

            if value.abs() < 0.001 {
                assert_eq!(pan, PAN_CENTER, "value {value}");
            } else {
                assert_ne!(pan, PAN_CENTER, "value {value}");
            }
            if value >= 0.999 {
                assert_eq!(pan, PAN_RIGHT, "value {value}");
            } else if value <= -0.999 {
                assert_eq!(pan, PAN_LEFT, "value {value}");
            } else {
                assert!(pan > PAN_LEFT && pan < PAN_RIGHT, "value {value} gave {pan}");
            }
            assert_eq!(pan.signum(), if pan == 0 { 0 } else { value.signum() as i32 });
        }
    }

    #[test]
    fn test_pan_boundaries() {
        assert_eq!(pan_to_db(0.0), PAN_CENTER);
        assert_eq!(pan_to_db(0.000_999), PAN_CENTER);
        assert_eq!(pan_to_db(-0.000_999), PAN_CENTER);
        assert_eq!(pan_to_db(0.001), 1);
        assert_eq!(pan_to_db(-0.001), -1);
        assert_eq!(pan_to_db(0.999), PAN_RIGHT);
        assert_eq!(pan_to_db(-0.999), PAN_LEFT);
        assert_eq!(pan_to_db(1.0), PAN_RIGHT);
        assert_eq!(pan_to_db(-7.0), PAN_LEFT);
        assert_eq!(pan_to_db(f32::NAN), PAN_CENTER);
        // |2000 * log10(0.5)| = 602.06, rounded up
        assert_eq!(pan_to_db(0.5), 603);
        assert_eq!(pan_to_db(-0.5), -603);
    }

    #[test]
    fn test_pitch_to_frequency() {
        assert_eq!(pitch_to_frequency(1.0, 44100), 44100);
        assert_eq!(pitch_to_frequency(0.5, 44100), 22050);
        assert_eq!(pitch_to_frequency(0.0, 44100), FREQUENCY_MIN);
        assert_eq!(pitch_to_frequency(-2.0, 44100), FREQUENCY_MIN);
        assert_eq!(pitch_to_frequency(10.0, 44100), FREQUENCY_MAX);
    }

    #[test]
    fn test_cursor_for_offset() {
        let format = FormatDescriptor::stereo16(44100);

        assert_eq!(cursor_for_offset(&format, 0.0, 176_400), 0);
        assert_eq!(cursor_for_offset(&format, 0.5, 176_400), 88_200);
        // Clamped to the last frame of the buffer
        assert_eq!(cursor_for_offset(&format, 5.0, 176_400), 176_396);
        assert_eq!(cursor_for_offset(&format, 5.0, 1000), 996);
    }

    #[test]
    fn test_cursor_for_offset_aligns_down() {
        let mono8 = FormatDescriptor::new(1, 1000, 8);

        // 7 bytes in, aligned down to a 4-byte boundary
        assert_eq!(cursor_for_offset(&mono8, 0.0075, 1000), 4);
        assert_eq!(cursor_for_offset(&mono8, 0.0095, 1000), 8);
        assert_eq!(cursor_for_offset(&mono8, 0.5, 1000) % 4, 0);
    }
}
