use lazy_static::lazy_static;
use time::{macros::format_description, Duration, OffsetDateTime};

lazy_static! {
    static ref UNIX_TIME_UNIT_OFFSET: i128 = Duration::milliseconds(1).whole_nanoseconds();
}

pub fn format_time_millis(ts_millis: u64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp_nanos((ts_millis as i128) * (*UNIX_TIME_UNIT_OFFSET))
        .ok()
        .and_then(|t| t.format(&format).ok())
        .unwrap_or_else(|| ts_millis.to_string())
}

pub fn curr_time_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / (*UNIX_TIME_UNIT_OFFSET)) as u64
}

pub fn sleep_for_ms(millis: u64) {
    std::thread::sleep(std::time::Duration::from_millis(millis));
}
