use indoc::formatdoc;
use itertools::Itertools;
use shared::{Role, Turn};
use uuid::Uuid;

pub(crate) fn conversation(slug: Uuid, turns: &[Turn], model_error: Option<&str>) -> String {
    let banner = model_error
        .map(|err| format!(r#"<p class="error">Model failed to load: {}</p>"#, escape(err)))
        .unwrap_or_default();

    let transcript = turns
        .iter()
        .map(|turn| {
            let class = match turn.role() {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!(
                r#"<p class="{class}"><strong>{}:</strong> {}</p>"#,
                turn.role(),
                escape(turn.content())
            )
        })
        .join("\n");

    formatdoc!(
        r#"
        <!DOCTYPE html>
        <html>
        <head>
        <meta charset="utf-8">
        <title>Dialog Chatbot</title>
        </head>
        <body>
        <h1>Dialog Chatbot</h1>
        {banner}
        <div id="transcript">
        {transcript}
        </div>
        <form method="post" action="/conversations/{slug}">
        <label for="message">You:</label>
        <input id="message" name="message" type="text" autocomplete="off" autofocus>
        <button type="submit">Send</button>
        </form>
        <form method="post" action="/conversations/{slug}/end">
        <button type="submit">New chat</button>
        </form>
        </body>
        </html>
        "#
    )
}

pub(crate) fn not_found(slug: Uuid) -> String {
    formatdoc!(
        r#"
        <!DOCTYPE html>
        <html>
        <head><meta charset="utf-8"><title>Not found</title></head>
        <body>
        <p>Conversation {slug} does not exist. <a href="/">Start a new chat</a>.</p>
        </body>
        </html>
        "#
    )
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
