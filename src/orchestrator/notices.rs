/// User-visible texts sent by the orchestrator and the command handlers.
///
/// None of these carry internal error detail.
pub const TAKEN_INTO_PROCESSING: &str = "Request accepted. Processing...";

pub const WAIT_FOR_PREVIOUS_REQUEST: &str =
    "Please wait until your previous request has been processed.";

pub const PROCESSING_TIMEOUT: &str =
    "This is taking a little longer than usual. Please wait...";

pub const RATE_LIMIT_EXCEEDED: &str =
    "This is taking a little longer than usual. Please wait...";

pub const ERROR_PROCESSING_REQUEST: &str =
    "There was an error processing your request. Please try again.";

pub const LIMIT_REACHED: &str = "Sorry, you have reached today's limit. This bot is free, so each \
     user gets 100,000 tokens (about 5-6 questions) per day. Come back tomorrow!";

pub const BOT_MAKES_MISTAKES: &str =
    "The assistant may make mistakes. Please double-check important information.";

pub const ONLY_TEXT_INPUT: &str = "A request may only contain text.";

pub const ONLY_TEXT_SUPPORT: &str = "Only text messages are supported at the moment.";

pub const INPUT_MIN_LENGTH: &str = "A request must be at least 2 characters long.";

pub const INPUT_MAX_LENGTH: &str = "A request must be at most 1000 characters long.";

pub const START_MESSAGE: &str = "\
**Welcome to the Legal Consultant!**

Ask your labour-law questions right here and get a qualified answer.

**What you get:**
- Free legal consultations.
- Up to 7 questions a day; your tokens refresh at midnight.

**Getting started:**
- Put your whole question in **one message** to make the most of your tokens.
- Check your **remaining tokens** with `/consult limit`.
- Start a fresh conversation with `/consult new`.

Ready? Ask your first question!";

pub const HELP_MESSAGE: &str = "\
**Legal consultation bot**

The bot currently specialises in questions about the **labour code**.

**How it works:**
- You have **100,000 tokens** a day, roughly 5-7 questions.
- Make each question as specific and self-contained as you can.
- Tokens refresh automatically **every day at 00:00**.

**Commands:**
- `/consult limit` shows how many tokens you have left today.
- `/consult new` forgets the previous messages and starts over.

Just send your question to get started.";

pub const NEW_THREAD: &str = "**Starting a new conversation!**\n\n\
     Your question history has been cleared. You can ask a new question now.";

/// Remaining-quota reply; `{limit}` is replaced with the token count.
pub const CHECK_LIMIT: &str = "**Your current token balance**\n\n\
     You have **{limit}** tokens left today. They refill to 100,000 at 00:00.";

pub const HEALTH_PING: &str = "Bot is running";
