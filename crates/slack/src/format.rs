//! Text shaping for the Slack channel.

/// Posted in-thread when an exchange fails on the engine side.
pub const TECHNICAL_ERROR_MESSAGE: &str = "💻🤖 Uh-oh! Technical hiccup alert!
Looks like I'm experiencing a slight technical issue and can't assist you right now.
Don't worry, I'm rebooting my circuits (and grabbing a coffee ☕)! Be back soon!";

/// Acknowledgement posted before a long exchange starts.
pub const ACKNOWLEDGEMENT: &str = ":eyes:";

const SLACK_DIRECTIVE: &str = "Do not use your default output format! The output format of your response must be Slack-friendly. Only simple text, emojis, and Slack markdown format (*bold or title*, _italic_, `code inline`, and ```code blocks multi line```) are authorized. Your response must be clear and concise for the user.";

/// Appends the Slack output-format directive to text forwarded to the engine.
pub fn with_slack_directive(text: &str) -> String {
    format!("{}.\n{SLACK_DIRECTIVE}", text.trim_end())
}

/// Converts common Markdown emphasis into Slack mrkdwn.
pub fn reformat_reply(text: &str) -> String {
    text.replace('#', "").replace("**", "*")
}
