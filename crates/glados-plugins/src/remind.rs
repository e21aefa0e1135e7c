//! Reminders.
//!
//! ```text
//! glados remind me in 8 minutes to check rosh
//! glados, remind me at 7:00am to wake up
//! ```
//!
//! Pending reminders are stored in the session table `reminders` and
//! delivered by the minutely timed run once their time has passed.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta, TimeZone};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use glados_core::prelude::*;
use glados_core::{Directories, SharedSession};

use crate::compile;

const TABLE: &str = "reminders";

const HELP_TEXT: &str = "A plugin to remind you of things.
Usage:
glados remind me in 8 minutes to check rosh
glados remind me at 7:00am to wake up";

/// A pending reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Display name of the requester.
    pub user: String,
    /// Channel the request came from.
    pub channel: String,
    /// What to remind them of.
    pub what: String,
    /// When the reminder is due.
    pub time: DateTime<Local>,
}

pub struct RemindMe {
    name: String,
    outbox: Outbox,
    directories: Arc<Directories>,
    session: SharedSession,
    remind_re: Regex,
}

impl RemindMe {
    pub fn new(ctx: PluginContext) -> PluginResult<Self> {
        Ok(Self {
            name: ctx.name,
            outbox: ctx.outbox,
            directories: ctx.directories,
            session: ctx.session,
            remind_re: compile(
                r"(?i)^glados,? remind me (?:(?P<at>at (?P<hour>\d+):(?P<min>\d+)(?P<ampm>a|p)m)|(?P<in>in (?P<number>\d+) (?P<unit>minutes?|hours?|days?|weeks?))) (?P<what>.*)",
            )?,
        })
    }

    /// Parses a reminder request into its due time and subject.
    fn request(
        &self,
        text: &str,
        now: DateTime<Local>,
    ) -> PluginResult<Option<(DateTime<Local>, String)>> {
        let Some(caps) = self.remind_re.captures(text) else {
            return Ok(None);
        };
        let time = if caps.name("in").is_some() {
            after_delay(&caps, now)?
        } else {
            at_time_of_day(&caps, now)?
        };
        Ok(Some((time, caps["what"].to_string())))
    }

    fn next_key(&self) -> String {
        self.session
            .lock()
            .entries(TABLE)
            .filter_map(|(key, _)| key.parse::<u64>().ok())
            .max()
            .map_or(1, |n| n + 1)
            .to_string()
    }

    fn due(&self, now: DateTime<Local>) -> Vec<(String, Reminder)> {
        let session = self.session.lock();
        let keys: Vec<String> = session.entries(TABLE).map(|(key, _)| key.to_string()).collect();
        keys.into_iter()
            .filter_map(|key| match session.get::<Reminder>(TABLE, &key) {
                Ok(Some(reminder)) => Some((key, reminder)),
                Ok(None) => None,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable reminder");
                    None
                }
            })
            .filter(|(_, reminder)| reminder.time < now)
            .collect()
    }
}

fn out_of_range() -> PluginError {
    PluginError::failed("reminder time out of range")
}

fn after_delay(caps: &Captures<'_>, now: DateTime<Local>) -> PluginResult<DateTime<Local>> {
    let number: i64 = caps["number"].parse().map_err(|_| out_of_range())?;
    let unit = caps["unit"].to_ascii_lowercase();
    let delta = match unit.trim_end_matches('s') {
        "minute" => TimeDelta::try_minutes(number),
        "hour" => TimeDelta::try_hours(number),
        "day" => TimeDelta::try_days(number),
        _ => TimeDelta::try_weeks(number),
    }
    .ok_or_else(out_of_range)?;
    now.checked_add_signed(delta).ok_or_else(out_of_range)
}

/// The next occurrence of a 12-hour clock time, today or tomorrow.
fn at_time_of_day(caps: &Captures<'_>, now: DateTime<Local>) -> PluginResult<DateTime<Local>> {
    let hour: u32 = caps["hour"].parse().map_err(|_| out_of_range())?;
    let minute: u32 = caps["min"].parse().map_err(|_| out_of_range())?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return Err(PluginError::failed(format!("invalid time of day {hour}:{minute:02}")));
    }
    let pm = caps["ampm"].eq_ignore_ascii_case("p");
    let hour = hour % 12 + if pm { 12 } else { 0 };

    let naive = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(out_of_range)?;
    let time = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(out_of_range)?;
    if time < now {
        time.checked_add_signed(TimeDelta::days(1)).ok_or_else(out_of_range)
    } else {
        Ok(time)
    }
}

/// How the confirmation names the due time: `at 07:00am`,
/// `tomorrow at 07:00am`, `Friday at 07:00am` or `May 24 at 07:00am`.
pub fn describe(time: DateTime<Local>, now: DateTime<Local>) -> String {
    let at = format!("at {}", time.format("%I:%M%P"));
    match (time.date_naive() - now.date_naive()).num_days() {
        0 => at,
        1 => format!("tomorrow {at}"),
        2..=6 => format!("{} {at}", time.format("%A")),
        _ => format!("{} {at}", time.format("%b %d")),
    }
}

#[async_trait]
impl Plugin for RemindMe {
    fn name(&self) -> &str {
        &self.name
    }

    fn help_text(&self) -> &str {
        HELP_TEXT
    }

    fn can_handle(&self, msg: &InboundMessage) -> bool {
        msg.is_chat() && self.remind_re.is_match(msg.text())
    }

    async fn handle(&mut self, msg: &InboundMessage) -> PluginResult<()> {
        let (Some(user), Some(channel)) = (msg.user.as_deref(), msg.channel.as_deref()) else {
            return Ok(());
        };
        let now = Local::now();
        let Some((time, what)) = self.request(msg.text(), now)? else {
            return Ok(());
        };

        let reminder = Reminder {
            user: self.directories.user_name(user).unwrap_or(user).to_string(),
            channel: channel.to_string(),
            what: what.clone(),
            time,
        };
        let key = self.next_key();
        {
            let mut session = self.session.lock();
            session.put(TABLE, &key, &reminder)?;
            session.commit()?;
        }
        debug!(key = %key, due = %time, "Reminder stored");

        let reply = format!("Okay, I'll remind you {} {what}", describe(time, now));
        self.outbox.reply(reply, channel).await?;
        Ok(())
    }
}

#[async_trait]
impl TimedPlugin for RemindMe {
    fn interval(&self) -> &str {
        "* * * * *"
    }

    async fn run_timed_event(&mut self) -> PluginResult<()> {
        let due = self.due(Local::now());
        if due.is_empty() {
            return Ok(());
        }

        for (key, reminder) in due {
            let text = format!(
                "@{}, you asked me to remind you {}",
                reminder.user, reminder.what
            );
            if let Err(e) = self.outbox.reply(text, &reminder.channel).await {
                warn!(key = %key, error = %e, "Failed to deliver reminder");
            }
            self.session.lock().remove(TABLE, &key);
        }
        self.session.lock().commit()?;
        Ok(())
    }
}
