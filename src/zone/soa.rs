use chrono::{Local, NaiveDate};

/// Length of a `YYYYMMDDNN` serial
pub const SERIAL_LEN: usize = 10;

pub const DEFAULT_REFRESH: u32 = 7200;
pub const DEFAULT_RETRY: u32 = 3600;
pub const DEFAULT_EXPIRE: u32 = 1_209_600;
pub const DEFAULT_CACHE_TTL: u32 = 180;

/// Start of authority data for a zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoaRecord {
    /// Storage identity, assigned on first persist
    pub id: Option<String>,
    pub name: String,
    pub primary_name_server: String,
    pub mail_address: String,
    /// Date-based serial, `YYYYMMDD` followed by the two digit counter
    pub serial: String,
    /// Intra-day revision, wraps at 100
    pub serial_counter: u8,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    /// Negative cache TTL
    pub cache_ttl: u32,
}

impl SoaRecord {
    /// Build the default SOA for a new zone with a freshly advanced serial
    pub fn new_default(
        primary_name_server: impl Into<String>,
        mail_address: impl Into<String>,
    ) -> Self {
        let mut soa = Self {
            id: None,
            name: "@".to_string(),
            primary_name_server: primary_name_server.into(),
            mail_address: mail_address.into(),
            serial: String::new(),
            serial_counter: 0,
            refresh: DEFAULT_REFRESH,
            retry: DEFAULT_RETRY,
            expire: DEFAULT_EXPIRE,
            cache_ttl: DEFAULT_CACHE_TTL,
        };
        soa.update_serial();
        soa
    }

    /// Advance the serial using today's local date
    pub fn update_serial(&mut self) {
        self.update_serial_on(Local::now().date_naive());
    }

    /// Advance the serial for the given date
    pub fn update_serial_on(&mut self, date: NaiveDate) {
        let counter = ((u16::from(self.serial_counter) + 1) % 100) as u8;
        self.serial_counter = counter;
        self.serial = format!("{}{:02}", date.format("%Y%m%d"), counter);
    }

    pub fn is_valid(&self) -> bool {
        is_single_token(&self.name)
            && is_single_token(&self.primary_name_server)
            && is_single_token(&self.mail_address)
            && self.serial.chars().count() == SERIAL_LEN
            && self.refresh > 0
            && self.retry > 0
            && self.expire > 0
            && self.cache_ttl > 0
    }
}

fn is_single_token(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_default_soa() {
        let soa = SoaRecord::new_default("ns1.example.com.", "root.example.com.");
        assert_eq!(soa.name, "@");
        assert_eq!(soa.refresh, 7200);
        assert_eq!(soa.retry, 3600);
        assert_eq!(soa.expire, 1209600);
        assert_eq!(soa.cache_ttl, 180);
        assert_eq!(soa.serial_counter, 1);
        assert_eq!(soa.serial.len(), 10);
        assert!(soa.is_valid());
    }

    #[test]
    fn test_update_serial_same_day() {
        let mut soa = SoaRecord::new_default("ns1.example.com.", "root.example.com.");
        soa.update_serial_on(date());
        let first = soa.serial.clone();
        soa.update_serial_on(date());
        let second = soa.serial.clone();

        assert_eq!(first, "2024030902");
        assert_eq!(second, "2024030903");
        assert_eq!(first[..8], second[..8]);
    }

    #[test]
    fn test_update_serial_wraps() {
        let mut soa = SoaRecord::new_default("ns1.example.com.", "root.example.com.");
        soa.serial_counter = 98;
        soa.update_serial_on(date());
        assert_eq!(soa.serial, "2024030999");
        soa.update_serial_on(date());
        assert_eq!(soa.serial, "2024030900");
        assert_eq!(soa.serial_counter, 0);
        assert!(soa.is_valid());
    }

    #[test]
    fn test_invalid_soa() {
        let valid = SoaRecord::new_default("ns1.example.com.", "root.example.com.");

        let soa = SoaRecord {
            refresh: 0,
            ..valid.clone()
        };
        assert!(!soa.is_valid());

        let soa = SoaRecord {
            serial: "202403090".to_string(),
            ..valid.clone()
        };
        assert!(!soa.is_valid());

        let soa = SoaRecord {
            serial: "20240309011".to_string(),
            ..valid.clone()
        };
        assert!(!soa.is_valid());

        let soa = SoaRecord {
            mail_address: String::new(),
            ..valid.clone()
        };
        assert!(!soa.is_valid());

        // Written into the zone file SOA line
        let soa = SoaRecord {
            primary_name_server: "ns1.example.com. (\n".to_string(),
            ..valid
        };
        assert!(!soa.is_valid());
    }
}
