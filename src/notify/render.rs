//! Digest templating: one HTML body for mail clients and a plain-text twin
//! used by the email alternative part and the webhook channels.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::item::{Item, TrendType};
use crate::notify::Digest;
use crate::ranking::NotificationBatch;

pub const NO_SPIKES_SUBJECT: &str = "Viral Trend Update - No Spikes";

const STYLE: &str = "body{font-family:'Segoe UI',Tahoma,sans-serif;background:#121212;color:#fff;padding:20px}\
.container{max-width:800px;margin:0 auto;background:#1e1e1e;border-radius:10px;overflow:hidden}\
.header{background:#f00;padding:20px;text-align:center}.header h1{margin:0;color:#fff}\
.stats{background:#2d2d2d;padding:10px;text-align:center;font-size:.9em}\
.category-section{padding:20px;border-bottom:1px solid #333}\
.category-title{color:#ff4d4d;border-bottom:2px solid #ff4d4d;padding-bottom:5px}\
.video-card{background:#252525;margin-bottom:15px;padding:15px;border-radius:8px;display:flex;gap:15px}\
.thumbnail{flex:0 0 160px}.thumbnail img{width:100%;border-radius:5px}\
.video-title{color:#4dabf7;text-decoration:none;display:block;font-size:1.1em}\
.channel{color:#aaa;font-size:.85em}.metrics{font-size:.85em;color:#ccc;margin:8px 0}\
.badge{padding:3px 8px;border-radius:4px;font-size:.75em;font-weight:bold;color:#fff}\
.badge-exploding{background:#e03131}.badge-rising{background:#f08c00}.badge-steady{background:#2f9e44}\
.badge-short{background:#1098ad}.badge-news{background:#5c7cfa}.badge-gaming{background:#be4bdb}\
.ai-insight{background:#333;padding:10px;border-radius:5px;font-size:.9em;border-left:3px solid #ffd43b}\
.footer{text-align:center;padding:20px;color:#666;font-size:.8em}";

/// "🔥 Viral Trend Alert - 03:15 PM", or the fixed no-spikes subject.
pub fn subject(batch: &NotificationBatch, now: DateTime<Utc>) -> String {
    if batch.is_empty() {
        NO_SPIKES_SUBJECT.to_string()
    } else {
        format!("🔥 Viral Trend Alert - {}", now.format("%I:%M %p"))
    }
}

pub fn build_digest(batch: &NotificationBatch, region: &str, now: DateTime<Utc>) -> Digest {
    Digest {
        subject: subject(batch, now),
        html: render_html(batch, region, now),
        text: render_text(batch, region, now),
        item_count: batch.len(),
    }
}

/// 1234567 -> "1,234,567"
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn badge_class(t: TrendType) -> &'static str {
    match t {
        TrendType::Exploding => "badge-exploding",
        TrendType::FastRising => "badge-rising",
        TrendType::ViralShort => "badge-short",
        TrendType::ViralGaming => "badge-gaming",
        TrendType::News | TrendType::BreakingNews => "badge-news",
        TrendType::SteadyGrowth | TrendType::Regular => "badge-steady",
    }
}

pub fn render_html(batch: &NotificationBatch, region: &str, now: DateTime<Utc>) -> String {
    let mut html = String::with_capacity(8 * 1024);
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><style>{STYLE}</style></head><body>\
         <div class=\"container\"><div class=\"header\"><h1>🚀 YouTube Viral Pulse</h1></div>\
         <div class=\"stats\">Region: {} | Videos Analyzed: {} | Time: {}</div>",
        encode_text(region),
        batch.scored_count,
        now.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    if batch.is_empty() {
        html.push_str(
            "<div style=\"padding:40px;text-align:center;color:#888\">\
             <h3>No significant viral spikes detected in this cycle.</h3>\
             <p>Monitoring continues...</p></div>",
        );
    }

    for group in &batch.groups {
        let _ = write!(
            html,
            "<div class=\"category-section\"><h2 class=\"category-title\">{}</h2>",
            encode_text(group.category.label())
        );
        for (rank, item) in group.items.iter().enumerate() {
            html_card(&mut html, item, rank == 0);
        }
        html.push_str("</div>");
    }

    html.push_str(
        "<div class=\"footer\">Automated report by trend-pulse</div></div></body></html>",
    );
    html
}

fn html_card(html: &mut String, item: &Item, leader: bool) {
    let url = item.watch_url();
    let url_attr = encode_double_quoted_attribute(&url);
    let leader_tag = if leader {
        "<span style=\"color:#ffd43b\">👑 Category Leader</span><br>"
    } else {
        ""
    };

    let _ = write!(
        html,
        "<div class=\"video-card\"><div class=\"thumbnail\"><a href=\"{url_attr}\">\
         <img src=\"{}\" alt=\"Thumbnail\"></a></div><div class=\"content\">{leader_tag}\
         <a href=\"{url_attr}\" class=\"video-title\">{}</a><div class=\"channel\">{}</div>\
         <div class=\"metrics\">👀 {} &nbsp; 👍 {} &nbsp; 💬 {} &nbsp; ⚡ Score: {}</div>\
         <div><span class=\"badge {}\">{}</span> \
         <span class=\"badge\" style=\"background:#444\">Viral Prob: {}%</span></div>",
        encode_double_quoted_attribute(&item.thumbnail_url),
        encode_text(&item.title),
        encode_text(&item.channel),
        thousands(item.views),
        thousands(item.likes),
        thousands(item.comments),
        item.engagement_score.trunc() as u64,
        badge_class(item.trend_type),
        encode_text(&item.trend_type.to_string()),
        item.viral_probability,
    );

    if let Some(ins) = &item.insight {
        let _ = write!(
            html,
            "<div class=\"ai-insight\"><strong>AI Insight:</strong> {}<br>\
             <small>Trigger: {} | Audience: {}</small></div>",
            encode_text(&ins.why_trending),
            encode_text(&ins.emotional_trigger),
            encode_text(&ins.target_audience),
        );
    }
    html.push_str("</div></div>");
}

pub fn render_text(batch: &NotificationBatch, region: &str, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "YouTube Viral Pulse | Region: {region} | Videos Analyzed: {} | {}",
        batch.scored_count,
        now.format("%Y-%m-%d %H:%M UTC"),
    );

    if batch.is_empty() {
        out.push_str("\nNo significant viral spikes detected in this cycle.\n");
        return out;
    }

    for group in &batch.groups {
        let _ = writeln!(out, "\n== {} ==", group.category);
        for (rank, item) in group.items.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {} ({})\n   {} | {} views | {} | viral {}%\n   {}",
                rank + 1,
                item.title,
                item.channel,
                item.trend_type,
                thousands(item.views),
                item.engagement_score.trunc() as u64,
                item.viral_probability,
                item.watch_url(),
            );
            if let Some(ins) = &item.insight {
                let _ = writeln!(out, "   AI: {}", ins.why_trending);
            }
        }
    }
    out
}
