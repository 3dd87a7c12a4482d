use crate::util::markdown::escape_markdown;

/// Feature overview sent for `/help` (Markdown).
pub const HELP_TEXT: &str = "🚀 *About Our Upcoming Project*\n\n\
🧠 *We are planning to add these Core Features*\n\n\
1️⃣ *📄 AI-Powered Summarization*\n\
Upload PDFs, YouTube links, podcasts, lecture notes, or text files. \
Our app extracts, transcribes, and summarizes content in Uzbek, Russian, or English.\n\n\
2️⃣ *🎯 Exam Preparation Modules*\n\
• Support for DTM (Uzbekistan) and IELTS exams\n\
• Subject-specific practice\n\
• Generate quizzes from your materials\n\
• Mini and Full Mock Exams with real conditions\n\n\
3️⃣ *📆 AI-Generated Study Plans*\n\
Get personalized weekly schedules based on your exam date and subjects.\n\n\
4️⃣ *🧪 Quiz Generation & Tracking*\n\
• Auto-generated quizzes from your materials\n\
• Multiple-choice questions\n\
• Timer-enabled quiz environment\n\
• Comprehensive progress tracking\n\n\
Stay tuned for more updates! We'll notify you when we're ready to launch.";

/// Reply to any free-text message (plain text).
pub const ECHO_TEXT: &str =
    "Thanks for your message! If you need information about our project, please use the /help command.";

/// Greeting sent for `/start` (Markdown).
pub fn welcome_text(first_name: &str) -> String {
    format!(
        "*Welcome to SimpleLearn! 🎓*\n\n\
Hello *{name}*! 👋\n\n\
*Thank you for joining our waitlist!* We're thrilled to have you as one of our early supporters.\n\n\
🚀 We're currently developing an *AI-powered educational platform* that will revolutionize how you learn:\n  • 📚 Smart document summarization\n  • 📝 Exam preparation modules\n  • 📅 Personalized study plans\n\n\
⏱️ *Coming Soon in 2025!*\n\n\
Join our channel: @SimpleLearnUz. We'll keep you updated on our progress and exciting new features. \
Type /help to discover more details about our upcoming project. \n\n\
_Your journey to smarter learning starts here!_",
        name = escape_markdown(first_name)
    )
}
