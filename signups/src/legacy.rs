//! Detection of the retired user-agent / IP columns.
//!
//! Early files were written with two trailing `ua,ip` columns. They are no
//! longer collected: reads drop them and the next append drops them from the
//! header. Both paths use [`has_trailing_ua_ip`].

pub const RETIRED_COLUMNS: [&str; 2] = ["ua", "ip"];

/// True when the last two columns are `ua`, `ip` (case-insensitive).
pub fn has_trailing_ua_ip<S: AsRef<str>>(columns: &[S]) -> bool {
    match columns {
        [.., ua, ip] => {
            ua.as_ref().trim().eq_ignore_ascii_case(RETIRED_COLUMNS[0])
                && ip.as_ref().trim().eq_ignore_ascii_case(RETIRED_COLUMNS[1])
        }
        _ => false,
    }
}
