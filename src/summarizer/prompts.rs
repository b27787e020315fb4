const SUMMARY_SCHEMA: &str = r#"{
  "overview": "A concise overview of the whole document (at most 200 characters)",
  "keyPoints": ["Key point 1", "Key point 2", "Key point 3"],
  "sections": [
    {
      "title": "Section name",
      "content": "Detailed summary of the section",
      "importance": "high|medium|low",
      "page": page number (PDF only)
    }
  ],
  "wordCount": estimated number of characters,
  "pageCount": number of pages (PDF only),
  "topics": ["Topic 1", "Topic 2", "Topic 3"],
  "difficulty": "beginner|intermediate|advanced"
}"#;

pub fn detailed_summary_prompt(content: &str, file_name: &str, language: &str) -> String {
    format!(
        "Analyze the content of the document \"{file_name}\" in detail and return a JSON response in the following format:\n\
         \n\
         {SUMMARY_SCHEMA}\n\
         \n\
         Content to analyze:\n\
         {content}\n\
         \n\
         Instructions:\n\
         - Answer in {language}; keep the JSON keys and enum values in English exactly as shown\n\
         - Analyze thoroughly so that no important information is missed\n\
         - Split sections along the logical structure of the document\n\
         - Judge difficulty by the complexity and degree of expertise of the content\n\
         - Follow the JSON format strictly\n"
    )
}

pub fn quick_summary_prompt(content: &str, language: &str) -> String {
    format!(
        "Summarize the following content concisely in 3 to 5 lines. \
         Extract only the important points and answer in {language}:\n\
         \n\
         {content}\n"
    )
}

/// Cuts `content` to at most `max_chars` characters without splitting a
/// UTF-8 sequence.
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &content[..byte_index],
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::{detailed_summary_prompt, quick_summary_prompt, truncate_chars};

    #[test]
    fn detailed_prompt_embeds_file_content_and_schema() {
        let prompt = detailed_summary_prompt("Body text", "plan.pdf", "Japanese");
        assert!(prompt.contains("\"plan.pdf\""));
        assert!(prompt.contains("Body text"));
        assert!(prompt.contains("\"keyPoints\""));
        assert!(prompt.contains("beginner|intermediate|advanced"));
        assert!(prompt.contains("Answer in Japanese"));
    }

    #[test]
    fn quick_prompt_requests_short_answer() {
        let prompt = quick_summary_prompt("Minutes of the meeting", "English");
        assert!(prompt.contains("3 to 5 lines"));
        assert!(prompt.contains("answer in English"));
        assert!(prompt.ends_with("Minutes of the meeting\n"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("日本語のテキスト", 3), "日本語");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
