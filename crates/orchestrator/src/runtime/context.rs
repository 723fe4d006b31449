//! Message-list budgeting and history compression.
//!
//! Before every model call the message list is trimmed to an approximate
//! token budget (chars/4), always protecting the system prompt and the
//! most recent messages. When the estimate crosses the compression
//! threshold, the older section is summarized by one extra model call and
//! replaced with a summary system message.

use ha_domain::config::ReactConfig;
use ha_domain::{Message, Role};
use ha_providers::{ChatRequest, LlmProvider};

/// Approximate token count for one message (chars / 4).
pub fn estimate_message_tokens(message: &Message) -> usize {
    message.content.approx_len() / 4
}

/// Approximate token count for a message list.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Trim `messages` to fit `budget` tokens.
///
/// System messages and the last `preserve_recent` messages are always
/// kept; dropped middle messages are replaced with a single marker so the
/// model knows history was elided.
pub fn truncate_to_budget(
    messages: Vec<Message>,
    budget: usize,
    preserve_recent: usize,
) -> Vec<Message> {
    if estimate_tokens(&messages) <= budget {
        return messages;
    }

    let recent_start = messages.len().saturating_sub(preserve_recent);
    let mut protected: Vec<Message> = Vec::new();
    let mut middle: Vec<(usize, Message)> = Vec::new();

    for (i, message) in messages.into_iter().enumerate() {
        if message.role == Role::System || i >= recent_start {
            protected.push(message);
        } else {
            middle.push((i, message));
        }
    }

    // Keep as much of the newest middle as fits after the protected set.
    let protected_tokens = estimate_tokens(&protected);
    let mut kept_middle: Vec<(usize, Message)> = Vec::new();
    let mut used = protected_tokens;
    for (i, message) in middle.iter().rev() {
        let cost = estimate_message_tokens(message);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept_middle.push((*i, message.clone()));
    }
    kept_middle.reverse();

    let dropped = middle.len() - kept_middle.len();

    // Reassemble in original order: system messages first (their original
    // relative order), then a marker, then kept middle, then recent.
    let mut result: Vec<Message> = Vec::new();
    let mut recent: Vec<Message> = Vec::new();
    for message in protected {
        if message.role == Role::System {
            result.push(message);
        } else {
            recent.push(message);
        }
    }
    if dropped > 0 {
        result.push(Message::system(format!(
            "[{dropped} earlier messages removed for context management]"
        )));
    }
    result.extend(kept_middle.into_iter().map(|(_, m)| m));
    result.extend(recent);
    result
}

/// Whether history compression should run before the next model call.
pub fn should_compress(messages: &[Message], config: &ReactConfig) -> bool {
    estimate_tokens(messages) >= config.compression_threshold
}

/// Summarize the older section of the conversation with one model call and
/// replace it with a summary system message. Returns the summary text.
///
/// On summarizer failure the messages are left untouched and `None` is
/// returned — budget truncation still bounds the next call.
pub async fn compress_history(
    provider: &dyn LlmProvider,
    model: Option<String>,
    messages: &mut Vec<Message>,
    preserve_recent: usize,
) -> Option<String> {
    let recent_start = messages.len().saturating_sub(preserve_recent);
    if recent_start == 0 {
        return None;
    }

    let (older, recent): (Vec<_>, Vec<_>) = {
        let mut older = Vec::new();
        let mut recent = Vec::new();
        for (i, m) in messages.iter().enumerate() {
            if m.role == Role::System {
                continue;
            }
            if i < recent_start {
                older.push(m.clone());
            } else {
                recent.push(m.clone());
            }
        }
        (older, recent)
    };
    if older.is_empty() {
        return None;
    }

    let mut conversation = String::new();
    for message in &older {
        let label = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
            Role::System => "System",
        };
        conversation.push_str(label);
        conversation.push_str(": ");
        let text = message.content.extract_all_text();
        if text.len() > 2000 {
            conversation.push_str(&text[..1000]);
            conversation.push_str(" [...] ");
        } else {
            conversation.push_str(&text);
        }
        conversation.push('\n');
    }

    let prompt = format!(
        "Summarize the following conversation history into a concise summary \
         that preserves:\n\
         1. The current goal being worked on\n\
         2. Key decisions and findings\n\
         3. Open questions or pending work\n\
         4. Tool state (sessions, files, running work)\n\n\
         Be concise but keep all actionable context. Present tense.\n\n\
         CONVERSATION:\n{conversation}"
    );

    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        tools: vec![],
        temperature: Some(0.1),
        max_tokens: Some(2000),
        json_mode: false,
        model,
    };

    let summary = match provider.chat(&req).await {
        Ok(response) => response.content,
        Err(e) => {
            tracing::warn!(error = %e, "history compression failed, continuing uncompressed");
            return None;
        }
    };

    let system_messages: Vec<Message> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();

    let mut rebuilt = system_messages;
    rebuilt.push(Message::system(format!(
        "[Previous conversation summary]\n{summary}"
    )));
    rebuilt.extend(recent);
    *messages = rebuilt;

    Some(summary)
}
