//! Renders display labels with minijinja.

use minijinja::Environment;
use serde_json::json;
use thiserror::Error;

use crate::{
    config::{DisplayConfig, DisplayTemplates, TierColors},
    models::{DisplayNotification, Highlight, NotificationRequest},
};

/// Error type for the TemplateService.
#[derive(Debug, Error)]
pub enum TemplateServiceError {
    /// An error occurred while compiling or rendering the template.
    #[error("Failed to render template: {0}")]
    RenderError(#[from] minijinja::Error),
}

/// A minijinja filter turning a 0..1 ratio into a whole percentage.
fn percent(value: f64) -> String {
    format!("{:.0}", value * 100.0)
}

/// A service for rendering templates using the minijinja templating engine.
pub struct TemplateService {
    env: Environment<'static>,
}

impl Default for TemplateService {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateService {
    /// Creates a new instance with strict undefined handling and the
    /// `percent` filter.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        env.add_filter("percent", percent);
        Self { env }
    }

    /// Renders a template with the given context.
    pub fn render(
        &self,
        template_str: &str,
        context: serde_json::Value,
    ) -> Result<String, TemplateServiceError> {
        self.env.render_str(template_str, context).map_err(|e| {
            tracing::warn!("Failed to render template '{}': {}", template_str, e);
            TemplateServiceError::RenderError(e)
        })
    }

    /// Checks that a template renders against `context`, with the same
    /// filters and undefined handling used for real notifications.
    pub fn check(
        &self,
        template_str: &str,
        context: serde_json::Value,
    ) -> Result<(), TemplateServiceError> {
        self.render(template_str, context).map(|_| ())
    }
}

/// Variables available to every template. Highlight templates also get
/// `year` or `milestone`.
fn base_context(request: &NotificationRequest) -> serde_json::Value {
    let event = &request.event;
    json!({
        "common_name": event.common_name,
        "scientific_name": event.scientific_name,
        "confidence": event.confidence,
        "station": event.station,
        "tier": request.tier.as_str(),
        "timestamp": event.timestamp.to_rfc3339(),
    })
}

fn sample_context() -> serde_json::Value {
    json!({
        "common_name": "European Robin",
        "scientific_name": "Erithacus rubecula",
        "confidence": 0.9,
        "station": "garden",
        "tier": "common",
        "timestamp": "2025-01-01T00:00:00+00:00",
    })
}

/// Turns a [`NotificationRequest`] into the payload the display expects.
pub struct NotificationRenderer {
    service: TemplateService,
    templates: DisplayTemplates,
    colors: TierColors,
    duration_secs: u64,
}

impl NotificationRenderer {
    /// Creates a renderer, failing if a configured template does not compile.
    pub fn new(config: &DisplayConfig) -> Result<Self, TemplateServiceError> {
        let service = TemplateService::new();
        let sample = sample_context();
        service.check(&config.templates.detection, sample.clone())?;

        let mut with_year = sample.clone();
        with_year["year"] = json!(2025);
        service.check(&config.templates.first_of_year, with_year)?;

        let mut with_milestone = sample;
        with_milestone["milestone"] = json!(100);
        service.check(&config.templates.milestone, with_milestone)?;

        Ok(Self {
            service,
            templates: config.templates.clone(),
            colors: config.colors.clone(),
            duration_secs: config.duration_secs.as_secs(),
        })
    }

    /// Renders the label, color and icon for a notification. Highlight
    /// labels are joined in order.
    pub fn render(
        &self,
        request: &NotificationRequest,
    ) -> Result<DisplayNotification, TemplateServiceError> {
        let event = &request.event;
        let mut context = base_context(request);

        let text = if request.highlights.is_empty() {
            self.service.render(&self.templates.detection, context)?
        } else {
            let mut labels = Vec::with_capacity(request.highlights.len());
            for highlight in &request.highlights {
                let template = match highlight {
                    Highlight::FirstOfYear { year } => {
                        context["year"] = json!(year);
                        &self.templates.first_of_year
                    }
                    Highlight::Milestone { threshold } => {
                        context["milestone"] = json!(threshold);
                        &self.templates.milestone
                    }
                };
                labels.push(self.service.render(template, context.clone())?);
            }
            labels.join(" | ")
        };

        let color = if request.is_highlight() {
            self.colors.highlight.clone()
        } else {
            self.colors.for_tier(request.tier).to_string()
        };

        Ok(DisplayNotification {
            text,
            icon: request.tier.as_str().to_string(),
            color,
            duration_secs: self.duration_secs,
            media: event.media.clone(),
        })
    }
}
