//! Prompt text shared by providers.

pub const CAPTION_PROMPT: &str = "What's in this image? Provide a brief summary.";

pub fn story_prompt(captions: &[String]) -> String {
    format!(
        "Based on the following image summaries, create a compelling and engaging short story:\n\n{}",
        captions.join("\n\n")
    )
}

pub fn improve_prompt(current: &str, captions: &[String], instruction: &str) -> String {
    format!(
        "Original story:\n{current}\n\n\
         Image summaries:\n{summaries}\n\n\
         Instruction:\n{instruction}\n\n\
         Please improve the story based on the given instruction while considering the image summaries.",
        summaries = captions.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captions() -> Vec<String> {
        vec!["A red kite over a beach".into(), "Two kids eating ice cream".into()]
    }

    #[test]
    fn story_prompt_lists_every_caption() {
        let prompt = story_prompt(&captions());
        assert!(prompt.starts_with("Based on the following image summaries"));
        assert!(prompt.contains("A red kite over a beach\n\nTwo kids eating ice cream"));
    }

    #[test]
    fn improve_prompt_carries_story_captions_and_instruction() {
        let prompt = improve_prompt("Once upon a time.", &captions(), "Make it spooky");
        assert!(prompt.contains("Original story:\nOnce upon a time."));
        assert!(prompt.contains("A red kite over a beach\nTwo kids eating ice cream"));
        assert!(prompt.contains("Instruction:\nMake it spooky"));
        assert!(prompt.ends_with("considering the image summaries."));
    }
}
