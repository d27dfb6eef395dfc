//! Centralized constants
//!
//! Single source of truth for the generic operational parameters used across
//! crates. Per-agent values (thresholds an operator tunes) live on
//! [`crate::AgentConfig`], not here.

/// Vendor endpoints (env overrides with fallback defaults)
pub mod endpoints {
    use once_cell::sync::Lazy;

    /// OpenAI-compatible chat endpoint (env: OPENAI_API_BASE)
    pub static OPENAI_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
    });

    /// Groq chat endpoint (env: GROQ_API_BASE)
    pub static GROQ_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("GROQ_API_BASE")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string())
    });

    /// x.ai (grok) chat endpoint (env: XAI_API_BASE)
    pub static XAI_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("XAI_API_BASE").unwrap_or_else(|_| "https://api.x.ai/v1".to_string())
    });

    /// Anthropic OpenAI-compatible endpoint (env: ANTHROPIC_API_BASE)
    pub static ANTHROPIC_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("ANTHROPIC_API_BASE")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string())
    });

    /// Gemini OpenAI-compatible endpoint (env: GEMINI_API_BASE)
    pub static GEMINI_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("GEMINI_API_BASE").unwrap_or_else(|_| {
            "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
        })
    });
}

/// Turn-taking timing
pub mod turns {
    /// Wait after an STT endpoint signal before committing the user turn (ms)
    pub const ENDPOINT_DEBOUNCE_MS: u64 = 800;

    /// A further final transcript within this window keeps buffering (ms)
    pub const FINAL_COALESCE_MS: u64 = 700;

    /// Barge-in must be honored within this bound of the partial arriving (ms)
    pub const BARGE_IN_DEADLINE_MS: u64 = 300;

    /// Grace after expected playback end before hangup on an ending node (ms)
    pub const HANGUP_GRACE_MS: u64 = 500;

    /// Network-propagation buffer: audio may still be audible this long
    /// after the ledger's expected end (ms)
    pub const PLAYBACK_TAIL_MS: u64 = 400;
}

/// Carrier stream behavior
pub mod carrier {
    /// Repeats of the `clear` directive on interruption; the carrier
    /// occasionally drops a single clear mid-burst and re-sends are
    /// idempotent
    pub const CLEAR_REPEATS: u32 = 3;

    /// Spacing between repeated clears (ms)
    pub const CLEAR_SPACING_MS: u64 = 10;

    /// Steady-state egress pacing: one media frame per 20 ms
    pub const EGRESS_PACE_MS: u64 = 20;

    /// Writer throttle: never run more than this far ahead of wallclock (s)
    pub const MAX_BUFFER_AHEAD_SECS: f64 = 2.0;
}

/// Vendor session maintenance
pub mod vendors {
    /// TTS keep-alive interval; forestalls the 20 s vendor idle timeout (s)
    pub const TTS_KEEPALIVE_SECS: u64 = 15;

    /// LLM generation ceiling (s)
    pub const LLM_GENERATION_TIMEOUT_SECS: u64 = 30;

    /// STT reconnect attempts on transport failure (immediate retries)
    pub const STT_RECONNECT_ATTEMPTS: u32 = 3;

    /// Cancellation must abort vendor streams within this bound (ms)
    pub const CANCEL_DEADLINE_MS: u64 = 200;
}

/// Shared call-state store
pub mod store {
    /// TTL for call-state entries (s)
    pub const CALL_STATE_TTL_SECS: u64 = 3600;
}

/// Dead-air monitoring
pub mod dead_air {
    /// Sampling interval of the monitor task (ms)
    pub const SAMPLE_INTERVAL_MS: u64 = 500;
}
