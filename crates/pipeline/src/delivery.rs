//! User-facing notification texts.

use atelier_core::outcome::PipelineOutcome;

/// Longest backend error fragment quoted to the user.
const ERROR_SNIPPET_LEN: usize = 100;

/// Caption/message for a finished session.
pub fn success_message(outcome: &PipelineOutcome) -> String {
    let mut text = if outcome.status == atelier_core::outcome::OutcomeStatus::Partial {
        format!(
            "✨ Your photo session is ready! {} photos came out well and are attached.",
            outcome.delivered_asset_urls.len()
        )
    } else {
        format!(
            "✨ Your photo session is ready! All {} photos are attached.",
            outcome.delivered_asset_urls.len()
        )
    };

    if !outcome.video_urls.is_empty() {
        text.push_str(&format!(
            "\n🎬 {} video clip{} included:",
            outcome.video_urls.len(),
            if outcome.video_urls.len() == 1 { " is" } else { "s are" }
        ));
        for url in &outcome.video_urls {
            text.push('\n');
            text.push_str(url);
        }
    }

    if let Some(archive) = &outcome.archive_url {
        text.push_str(&format!(
            "\n📦 Full-quality album: <a href=\"{archive}\">download</a>"
        ));
    }
    text
}

/// Message for a Job that produced nothing deliverable.
pub fn failure_message(error: &str) -> String {
    let snippet: String = error.chars().take(ERROR_SNIPPET_LEN).collect();
    format!(
        "😔 We could not finish your photo session: {snippet}\n\
         Your order was not consumed and our team has been notified."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::outcome::OutcomeStatus;

    fn outcome(status: OutcomeStatus, photos: usize, videos: usize) -> PipelineOutcome {
        PipelineOutcome {
            status,
            delivered_asset_urls: (0..photos).map(|i| format!("https://s/{i}.jpg")).collect(),
            archive_url: None,
            video_urls: (0..videos).map(|i| format!("https://s/{i}.mp4")).collect(),
            error: None,
        }
    }

    #[test]
    fn success_message_counts_photos() {
        let text = success_message(&outcome(OutcomeStatus::Success, 10, 0));
        assert!(text.contains("All 10 photos"));
        assert!(!text.contains("video"));
    }

    #[test]
    fn partial_message_admits_shortfall() {
        let text = success_message(&outcome(OutcomeStatus::Partial, 7, 0));
        assert!(text.contains("7 photos came out well"));
    }

    #[test]
    fn videos_and_archive_are_mentioned() {
        let mut o = outcome(OutcomeStatus::Success, 25, 2);
        o.archive_url = Some("https://s/album.zip".into());
        let text = success_message(&o);
        assert!(text.contains("2 video clips"));
        assert!(text.contains("https://s/0.mp4"));
        assert!(text.contains("album.zip"));
    }

    #[test]
    fn failure_message_truncates_long_errors() {
        let long = "x".repeat(500);
        let text = failure_message(&long);
        assert!(text.contains(&"x".repeat(100)));
        assert!(!text.contains(&"x".repeat(101)));
    }
}
