//! Turning stored messages into the text corpora the profile pipeline reads.

use crate::config::SERVICE_BOT_ID;
use crate::models::Message;

/// JSON array of the user's direct questions.
pub fn question_corpus(questions: &[String]) -> Result<String, serde_json::Error> {
    serde_json::to_string(questions)
}

/// Group `messages` by the counterpart of `user_id`, in order of each
/// counterpart's first appearance. Service-bot traffic is left out.
pub fn partition_conversations<'a>(user_id: &str, messages: &'a [Message]) -> Vec<Vec<&'a Message>> {
    let mut counterparts: Vec<&str> = Vec::new();
    let mut partitions: Vec<Vec<&Message>> = Vec::new();

    for message in messages {
        let counterpart = if message.sender_id == user_id {
            message.receiver_id.as_str()
        } else {
            message.sender_id.as_str()
        };
        if counterpart == SERVICE_BOT_ID {
            continue;
        }

        match counterparts.iter().position(|c| *c == counterpart) {
            Some(idx) => partitions[idx].push(message),
            None => {
                counterparts.push(counterpart);
                partitions.push(vec![message]);
            }
        }
    }

    partitions
}

/// JSON array of conversations, each an array of `"<sender>: <text>"` lines.
/// `None` when there is nothing to read.
pub fn conversation_corpus(partitions: &[Vec<&Message>]) -> Result<Option<String>, serde_json::Error> {
    if partitions.is_empty() {
        return Ok(None);
    }

    let rendered: Vec<Vec<String>> = partitions
        .iter()
        .map(|conversation| {
            conversation
                .iter()
                .map(|m| format!("{}: {}", m.sender_id, m.message))
                .collect()
        })
        .collect();

    serde_json::to_string(&rendered).map(Some)
}
