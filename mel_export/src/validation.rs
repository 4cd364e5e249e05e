/// Maximum text length for one synthesis call
const MAX_TEXT_LENGTH: usize = 5000;

/// Check synthesis input before the voice is loaded.
pub fn validate_synth_text(text: &str) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Text cannot be empty");
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        anyhow::bail!("Text too long (max {} characters)", MAX_TEXT_LENGTH);
    }
    Ok(())
}
