use crate::llm::ChatMessage;
use crate::llm::prompts::SOURCES_INSTRUCTION;

use super::history::Exchange;

pub fn assemble_messages(system_prompt: &str, history: &[Exchange], query: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(system_prompt));

    for exchange in history {
        messages.push(ChatMessage::user(exchange.query.as_str()));
        messages.push(ChatMessage::assistant(exchange.response.as_str()));
    }

    messages.push(ChatMessage::user(format!("{query}{SOURCES_INSTRUCTION}")));
    messages
}

#[cfg(test)]
mod tests {
    use super::assemble_messages;
    use crate::assistant::history::Exchange;
    use crate::llm::ChatRole;
    use crate::llm::prompts::SOURCES_INSTRUCTION;

    #[test]
    fn interleaves_history_between_system_and_current_query() {
        let history = vec![
            Exchange {
                query: "first".to_string(),
                response: "one".to_string(),
                timestamp: String::new(),
            },
            Exchange {
                query: "second".to_string(),
                response: "two".to_string(),
                timestamp: String::new(),
            },
        ];

        let messages = assemble_messages("system", &history, "third");
        let roles = messages.iter().map(|message| message.role).collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
            ]
        );

        let texts = messages
            .iter()
            .map(|message| message.text().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(texts[1], "first");
        assert_eq!(texts[2], "one");
        assert_eq!(texts[3], "second");
        assert_eq!(texts[4], "two");
        assert_eq!(texts[5], format!("third{SOURCES_INSTRUCTION}"));
    }

    #[test]
    fn empty_history_yields_system_and_query_only() {
        let messages = assemble_messages("system", &[], "hello");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), Some("system"));
    }
}
