//! Unit tests for the resource module

#[cfg(test)]
mod tests {
    use crate::decoder::StreamDecoder;
    use crate::error::AudioError;
    use crate::format::FormatDescriptor;
    use crate::resource::{sample_byte_size, SoundId, SoundMode, SoundResource};

    /// Decoder that only reports a layout.
    struct LayoutOnly(u16, u32);

    impl StreamDecoder for LayoutOnly {
        fn read(&mut self, _dst: &mut [u8]) -> anyhow::Result<usize> {
            Ok(0)
        }

        fn total_samples(&self) -> Option<u64> {
            None
        }

        fn channels_and_rate(&self) -> (u16, u32) {
            (self.0, self.1)
        }

        fn rewind(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sample_byte_size() {
        assert_eq!(sample_byte_size("tone", 4000).unwrap(), 4000);
        assert_eq!(sample_byte_size("tone", u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_sample_byte_size_rejects_oversized_data() {
        let result = sample_byte_size("huge", u32::MAX as usize + 1);

        assert!(matches!(result, Err(AudioError::Config(_))));
    }

    #[test]
    fn test_sample_takes_its_size_from_pcm() {
        let sound = SoundResource::sample(
            SoundId(1),
            "tone",
            SoundMode::default(),
            FormatDescriptor::stereo16(44100),
            vec![0; 4000],
        )
        .unwrap();

        assert_eq!(sound.buffer_byte_size(), 4000);
    }

    #[test]
    fn test_file_stream_rejects_impossible_layout() {
        let result = SoundResource::file_stream(
            SoundId(2),
            "wide",
            SoundMode::default().with_streaming(),
            Box::new(LayoutOnly(40000, 44100)),
        );

        assert!(matches!(result, Err(AudioError::Config(_))));
    }

    #[test]
    fn test_file_stream_downmixes_3d_stereo() {
        let sound = SoundResource::file_stream(
            SoundId(3),
            "stereo",
            SoundMode::default().with_streaming().with_3d(),
            Box::new(LayoutOnly(2, 44100)),
        )
        .unwrap();

        assert_eq!(sound.format(), FormatDescriptor::new(1, 44100, 16));
    }
}
