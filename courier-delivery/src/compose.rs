//! Renders the report subject and bodies.
//!
//! Composition is a pure function of its inputs: the generation timestamp is
//! passed in rather than read from the clock, so the same request always
//! yields byte-identical output.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{
    error::DeliveryError,
    types::{AttributeValue, PatientAttributes, Prediction},
};

const BRAND: &str = "MediCare+";

const DISCLAIMER: &str = "This AI prediction is for informational purposes only. \
    Consult healthcare professionals for medical decisions.";

/// A rendered report, ready to be framed as a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedReport {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// `₹` with two decimals and comma thousands grouping, e.g. `₹19,777.48`.
#[must_use]
pub fn format_currency(amount: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}₹{grouped}.{:02}", cents % 100)
}

/// A `0..=1` ratio as a percentage with one decimal, e.g. `85.0%`.
#[must_use]
pub fn format_percentage(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Renders subject, HTML body and text body for one report.
///
/// # Errors
///
/// [`DeliveryError::ContentPreparation`] if the amount is not finite or the
/// confidence lies outside `0..=1`.
pub fn compose(
    prediction: &Prediction,
    attributes: &PatientAttributes,
    recipient: &str,
    generated_at: DateTime<Utc>,
) -> Result<ComposedReport, DeliveryError> {
    if !prediction.amount.is_finite() {
        return Err(DeliveryError::ContentPreparation(format!(
            "Prediction amount {} is not a finite number",
            prediction.amount
        )));
    }
    if !(0.0..=1.0).contains(&prediction.confidence) {
        return Err(DeliveryError::ContentPreparation(format!(
            "Confidence {} is outside 0..=1",
            prediction.confidence
        )));
    }

    let amount = format_currency(prediction.amount);
    let confidence = format_percentage(prediction.confidence);
    let timestamp = generated_at.format("%B %d, %Y at %I:%M %p UTC").to_string();
    let details = details(attributes);

    Ok(ComposedReport {
        subject: format!("{BRAND} Insurance Report - {amount}"),
        html_body: html_body(&amount, &confidence, &timestamp, &details, recipient)?,
        text_body: text_body(&amount, &confidence, &timestamp, &details, recipient)?,
    })
}

/// Label/value pairs in display order; missing values render as `N/A`.
fn details(attributes: &PatientAttributes) -> [(&'static str, String); 6] {
    let plain = |value: &Option<AttributeValue>| {
        value
            .as_ref()
            .map_or_else(|| "N/A".to_string(), ToString::to_string)
    };

    [
        (
            "Age",
            attributes
                .age
                .as_ref()
                .map_or_else(|| "N/A".to_string(), |age| format!("{age} years")),
        ),
        ("BMI", plain(&attributes.bmi)),
        ("Gender", plain(&attributes.gender)),
        ("Smoker", plain(&attributes.smoker)),
        ("Region", plain(&attributes.region)),
        (
            "Premium",
            match &attributes.premium {
                Some(AttributeValue::Number(n)) if n.is_finite() => format_currency(*n),
                other => plain(other),
            },
        ),
    ]
}

fn text_body(
    amount: &str,
    confidence: &str,
    timestamp: &str,
    details: &[(&str, String)],
    recipient: &str,
) -> Result<String, DeliveryError> {
    let mut body = String::with_capacity(1024);
    let mut render = || -> std::fmt::Result {
        writeln!(body, "{BRAND} Medical Insurance Report")?;
        writeln!(body, "AI-Powered Insurance Analysis")?;
        writeln!(body)?;
        writeln!(body, "Predicted annual premium: {amount}")?;
        writeln!(body, "Confidence: {confidence}")?;
        writeln!(body, "Generated: {timestamp}")?;
        writeln!(body)?;
        writeln!(body, "Patient Details")?;
        for (label, value) in details {
            writeln!(body, "  {label}: {value}")?;
        }
        writeln!(body)?;
        writeln!(body, "Disclaimer: {DISCLAIMER}")?;
        writeln!(body)?;
        writeln!(body, "{BRAND} Platform")?;
        writeln!(body, "Report sent to: {recipient}")
    };
    render().map_err(|e| DeliveryError::ContentPreparation(e.to_string()))?;

    Ok(body)
}

fn html_body(
    amount: &str,
    confidence: &str,
    timestamp: &str,
    details: &[(&str, String)],
    recipient: &str,
) -> Result<String, DeliveryError> {
    let mut body = String::with_capacity(4096);
    let mut render = || -> std::fmt::Result {
        body.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
        writeln!(body, "<title>{BRAND} Prediction Report</title>")?;
        body.push_str("</head>\n<body style=\"font-family: Arial, sans-serif; color: #333;\">\n");
        body.push_str("<div style=\"max-width: 600px; margin: 0 auto;\">\n");

        writeln!(body, "<h1>{BRAND} Medical Insurance Report</h1>")?;
        body.push_str("<p>AI-Powered Insurance Analysis</p>\n");

        writeln!(
            body,
            "<div style=\"font-size: 28px; font-weight: bold;\">{}</div>",
            escape_html(amount)
        )?;
        writeln!(
            body,
            "<p>Confidence: {} | {}</p>",
            escape_html(confidence),
            escape_html(timestamp)
        )?;

        body.push_str("<h2>Patient Details</h2>\n<table>\n");
        for (label, value) in details {
            writeln!(
                body,
                "<tr><th align=\"left\">{label}</th><td>{}</td></tr>",
                escape_html(value)
            )?;
        }
        body.push_str("</table>\n");

        writeln!(body, "<p style=\"font-size: 12px;\"><strong>Disclaimer:</strong> {DISCLAIMER}</p>")?;
        writeln!(
            body,
            "<p style=\"font-size: 12px;\"><strong>{BRAND} Platform</strong> | Generated: {}</p>",
            escape_html(timestamp)
        )?;
        writeln!(body, "<p style=\"font-size: 12px;\">Report sent to: {}</p>", escape_html(recipient))?;

        body.push_str("</div>\n</body>\n</html>\n");
        Ok(())
    };
    render().map_err(|e| DeliveryError::ContentPreparation(e.to_string()))?;

    Ok(body)
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
