use crate::options::ConversionOptions;

/// Virtual file holding the source video for the running conversion.
pub const INPUT_SLOT: &str = "input-video";
/// Virtual file ffmpeg writes the GIF into. The extension selects the muxer.
pub const OUTPUT_SLOT: &str = "output.gif";

/// Renders a number the way a user typed it: `5`, not `5.0`.
pub fn format_number(value: f64) -> String {
    // -0.0 == 0.0, and "-0" would read as a sign error to ffmpeg users
    if value == 0.0 { 0.0f64 } else { value }.to_string()
}

/// Scale + frame rate reduction, then the two palette passes.
///
/// `palettegen` must see the same stream `paletteuse` remaps, hence the split.
pub fn filter_graph(options: &ConversionOptions) -> String {
    format!(
        "fps={},scale={}:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
        format_number(options.fps),
        options.width
    )
}

pub fn build_command(options: &ConversionOptions) -> Vec<String> {
    vec![
        "-i".to_string(),
        INPUT_SLOT.to_string(),
        "-t".to_string(),
        format_number(options.duration),
        "-ss".to_string(),
        format_number(options.start_time),
        "-vf".to_string(),
        filter_graph(options),
        "-loop".to_string(),
        "0".to_string(),
        OUTPUT_SLOT.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let i = args.iter().position(|a| a == flag).unwrap();
        &args[i + 1]
    }

    #[test]
    fn default_options_build_the_reference_command() {
        let args = build_command(&ConversionOptions::default());
        assert_eq!(
            args,
            [
                "-i",
                "input-video",
                "-t",
                "5",
                "-ss",
                "0",
                "-vf",
                "fps=10,scale=480:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
                "-loop",
                "0",
                "output.gif",
            ]
        );
    }

    #[test]
    fn fractional_values_keep_their_fraction() {
        let options = ConversionOptions {
            start_time: 1.25,
            duration: 2.5,
            fps: 12.5,
            ..Default::default()
        };
        let args = build_command(&options);
        assert_eq!(value_after(&args, "-t"), "2.5");
        assert_eq!(value_after(&args, "-ss"), "1.25");
        assert!(value_after(&args, "-vf").starts_with("fps=12.5,"));
    }

    #[test]
    fn negative_zero_renders_as_zero() {
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-1.5), "-1.5");

        let options = ConversionOptions { start_time: -0.0, ..Default::default() };
        assert_eq!(value_after(&build_command(&options), "-ss"), "0");
    }

    #[test]
    fn quality_does_not_change_the_command() {
        let low = ConversionOptions { quality: 1, ..Default::default() };
        let high = ConversionOptions { quality: 30, ..Default::default() };
        assert_eq!(build_command(&low), build_command(&high));
    }

    proptest! {
        #[test]
        fn command_reflects_options(
            start in 0u32..3600,
            start_frac in 0u32..4,
            duration in 1u32..600,
            width in 1u32..4096,
            fps in 1u32..60,
            quality in 1u32..=30,
        ) {
            let options = ConversionOptions {
                start_time: start as f64 + start_frac as f64 * 0.25,
                duration: duration as f64,
                width,
                fps: fps as f64,
                quality,
            };
            let args = build_command(&options);

            prop_assert_eq!(args.len(), 11);
            prop_assert_eq!(value_after(&args, "-t"), format_number(options.duration));
            prop_assert_eq!(value_after(&args, "-ss"), format_number(options.start_time));
            let vf = value_after(&args, "-vf");
            let fps_part = format!("fps={}", fps);
            let scale_part = format!("scale={}:-1", width);
            prop_assert!(vf.contains(&fps_part));
            prop_assert!(vf.contains(&scale_part));
            prop_assert_eq!(value_after(&args, "-loop"), "0");
            prop_assert_eq!(args.last().map(String::as_str), Some(OUTPUT_SLOT));
        }
    }
}
