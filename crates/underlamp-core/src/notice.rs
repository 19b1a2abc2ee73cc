//! Notification texts
//!
//! Markdown in the dialect chat webhooks accept (`<font color>` tags for
//! emphasis).

use chrono::{DateTime, Local};
use underlamp_api::Actor;
use underlamp_host_api::ResourceStatus;
use underlamp_util::{format_clock_time, remaining_minutes};

fn window(start: &DateTime<Local>, expire: &DateTime<Local>) -> String {
    format!("{} ~ {}", format_clock_time(start), format_clock_time(expire))
}

pub fn start_requested(
    instance: &str,
    actor: &Actor,
    start: &DateTime<Local>,
    expire: &DateTime<Local>,
) -> String {
    format!(
        "**[Start]** <font color=\"info\">{actor}</font> is starting {instance}.\n\
         > Window: <font color=\"comment\">{}</font>\n\
         > Remaining: <font color=\"warning\">{} min</font>",
        window(start, expire),
        remaining_minutes(expire, start),
    )
}

pub fn server_ready(
    instance: &str,
    start: &DateTime<Local>,
    expire: &DateTime<Local>,
    address: Option<&str>,
) -> String {
    format!(
        "**[{instance} is up]**\n\
         > Started: {}\n\
         > Window: <font color=\"warning\">{}</font>\n\
         > Address: <font color=\"info\">{}</font>",
        format_clock_time(start),
        window(start, expire),
        address.unwrap_or("unassigned"),
    )
}

pub fn start_confirmed(actor: &Actor, start: &DateTime<Local>, expire: &DateTime<Local>) -> String {
    format!(
        "**[Start succeeded]**\n\
         > Operator: {actor}\n\
         > Window: <font color=\"comment\">{}</font>",
        window(start, expire),
    )
}

pub fn extended(
    actor: &Actor,
    extra_minutes: i64,
    now: &DateTime<Local>,
    expire: &DateTime<Local>,
) -> String {
    format!(
        "**[Extend]** <font color=\"info\">{actor}</font> extended the run by {extra_minutes} min.\n\
         > New expiry: {}\n\
         > Remaining: <font color=\"warning\">{} min</font>",
        format_clock_time(expire),
        remaining_minutes(expire, now),
    )
}

pub fn stopped(instance: &str, actor: &Actor, at: &DateTime<Local>) -> String {
    format!(
        "**[Stop succeeded]** <font color=\"info\">{actor}</font> stopped {instance}.\n\
         > Time: {}",
        at.format("%H:%M:%S"),
    )
}

pub fn failure(title: &str, actor: &Actor, error: &dyn std::fmt::Display) -> String {
    format!("**[{title}]**\n> Operator: {actor}\n> Error: {error}")
}

pub fn resource_status(actor: &Actor, status: ResourceStatus) -> String {
    let color = match status {
        ResourceStatus::Running => "info",
        ResourceStatus::Stopped => "warning",
        _ => "comment",
    };
    format!(
        "**[Resource status]**\n\
         > Operator: <font color=\"info\">{actor}</font>\n\
         > Status: <font color=\"{color}\">{status}</font>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn start_requested_shows_window() {
        let text = start_requested("Pixelmon", &Actor::operator("Steve"), &at(20, 0), &at(21, 0));
        assert!(text.contains("Steve"));
        assert!(text.contains("20:00 ~ 21:00"));
        assert!(text.contains("60 min"));
    }

    #[test]
    fn ready_without_address() {
        let text = server_ready("Pixelmon", &at(20, 1), &at(21, 1), None);
        assert!(text.contains("unassigned"));
    }

    #[test]
    fn failure_names_actor_and_error() {
        let text = failure("Stop failed", &Actor::AutoShutdown, &"instance busy");
        assert!(text.contains("auto-shutdown"));
        assert!(text.contains("instance busy"));
    }
}
