//! Terminal output formatting.

pub mod colors;
pub mod errors;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: colors::ColorSupport::detect(),
        }
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.colors.dim(message));
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", self.colors.yellow("⚠"), message);
    }

    /// Heading line of a command's report
    pub fn step(&self, message: &str) {
        println!("{}", message);
    }

    /// One indented line of a listing
    pub fn item(&self, message: &str) {
        println!("  {}", message);
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
