//! Time-ordered 64 bit ids.
//!
//! From the most significant bit: 42 bits of milliseconds since an [`Epoch`],
//! 5 bits worker id, 5 bits process id and a 12 bit sequence that
//! distinguishes ids created within the same millisecond.
//!
//! Snowflakes are serialized as decimal strings, since JSON numbers above
//! 2^53 lose precision in JavaScript clients. Integers are still accepted.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Unexpected, Visitor},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_OFFSET: u32 = 22;
pub const TIMESTAMP_LENGTH: u32 = 42;

pub const WORKER_ID_OFFSET: u32 = 17;
pub const WORKER_ID_LENGTH: u32 = 5;

pub const PROCESS_ID_OFFSET: u32 = 12;
pub const PROCESS_ID_LENGTH: u32 = 5;

pub const SEQUENCE_OFFSET: u32 = 0;
pub const SEQUENCE_LENGTH: u32 = 12;

const fn max_value(length: u32) -> u64 {
    (1 << length) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("{part} {value} does not fit into {length} bits")]
pub struct SnowflakePartOutOfRangeError {
    part: &'static str,
    value: u64,
    length: u32,
}

macro_rules! node_id {
    ($name:ident, $length:ident, $offset:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
        pub struct $name(u8);

        impl $name {
            pub fn new(id: u8) -> Result<Self, SnowflakePartOutOfRangeError> {
                if u64::from(id) <= max_value($length) {
                    Ok(Self(id))
                } else {
                    Err(SnowflakePartOutOfRangeError {
                        part: stringify!($name),
                        value: id.into(),
                        length: $length,
                    })
                }
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }

            fn from_snowflake(snowflake: u64) -> Self {
                #[allow(clippy::cast_possible_truncation)]
                Self(((snowflake >> $offset) & max_value($length)) as u8)
            }
        }

        impl TryFrom<u8> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }
    };
}

node_id!(WorkerId, WORKER_ID_LENGTH, WORKER_ID_OFFSET);
node_id!(ProcessId, PROCESS_ID_LENGTH, PROCESS_ID_OFFSET);

/// Milliseconds since `SnowflakeEpoch`.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnowflakeTimestamp<SnowflakeEpoch>(u64, PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> SnowflakeTimestamp<SnowflakeEpoch> {
    #[must_use]
    pub fn new(millis: u64) -> Option<Self> {
        (millis <= max_value(TIMESTAMP_LENGTH)).then_some(Self(millis, PhantomData))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn now() -> Result<Self, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        Self::try_from(UtcDateTime::now())
    }
}

impl<SnowflakeEpoch: Epoch> TryFrom<UtcDateTime> for SnowflakeTimestamp<SnowflakeEpoch> {
    type Error = SnowflakeTimestampError;

    fn try_from(value: UtcDateTime) -> Result<Self, Self::Error> {
        let millis = (value - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
        let millis = u64::try_from(millis).map_err(|_| {
            if millis < 0 {
                Self::Error::TimeBeforeEpoch
            } else {
                Self::Error::TimestampTooLarge
            }
        })?;

        Self::new(millis).ok_or(Self::Error::TimestampTooLarge)
    }
}

impl<SnowflakeEpoch: Epoch> From<SnowflakeTimestamp<SnowflakeEpoch>> for UtcDateTime {
    fn from(value: SnowflakeTimestamp<SnowflakeEpoch>) -> Self {
        // 42 bits always fit into an i64
        #[allow(clippy::cast_possible_wrap)]
        let millis = value.0 as i64;
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Snowflake<SnowflakeEpoch>(u64, PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    /// `sequence` is truncated to its 12 bits.
    #[must_use]
    pub fn from_parts(
        timestamp: SnowflakeTimestamp<SnowflakeEpoch>,
        worker_id: WorkerId,
        process_id: ProcessId,
        sequence: u16,
    ) -> Self {
        let snowflake = timestamp.get() << TIMESTAMP_OFFSET
            | u64::from(worker_id.get()) << WORKER_ID_OFFSET
            | u64::from(process_id.get()) << PROCESS_ID_OFFSET
            | (u64::from(sequence) & max_value(SEQUENCE_LENGTH)) << SEQUENCE_OFFSET;

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp(self) -> SnowflakeTimestamp<SnowflakeEpoch> {
        SnowflakeTimestamp(self.0 >> TIMESTAMP_OFFSET, PhantomData)
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        WorkerId::from_snowflake(self.0)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        ProcessId::from_snowflake(self.0)
    }

    #[must_use]
    pub fn sequence(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let sequence = ((self.0 >> SEQUENCE_OFFSET) & max_value(SEQUENCE_LENGTH)) as u16;
        sequence
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> Serialize for Snowflake<SnowflakeEpoch> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de, SnowflakeEpoch> Deserialize<'de> for Snowflake<SnowflakeEpoch> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SnowflakeVisitor(PhantomData))
    }
}

struct SnowflakeVisitor<SnowflakeEpoch>(PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Visitor<'_> for SnowflakeVisitor<SnowflakeEpoch> {
    type Value = Snowflake<SnowflakeEpoch>;

    fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a snowflake as a decimal string or an unsigned integer")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Snowflake::new(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(v)
            .map(Snowflake::new)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.parse()
            .map(Snowflake::new)
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

/// Hands out strictly increasing snowflakes for one worker/process pair.
///
/// When the sequence of a millisecond is exhausted, or the clock moves
/// backwards, the generator keeps counting on its last timestamp instead of
/// reusing an id.
#[derive_where(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last: Option<(u64, u16)>,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last: None,
            phantom_data: PhantomData,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        let requested = SnowflakeTimestamp::<SnowflakeEpoch>::try_from(time)?.get();

        let (millis, sequence) = match self.last {
            Some((last_millis, last_sequence)) if requested <= last_millis => {
                if u64::from(last_sequence) < max_value(SEQUENCE_LENGTH) {
                    (last_millis, last_sequence + 1)
                } else {
                    (last_millis + 1, 0)
                }
            }
            _ => (requested, 0),
        };

        let timestamp =
            SnowflakeTimestamp::new(millis).ok_or(SnowflakeTimestampError::TimestampTooLarge)?;
        self.last = Some((millis, sequence));

        Ok(Snowflake::from_parts(
            timestamp,
            self.worker_id,
            self.process_id,
            sequence,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, ProcessId, Snowflake, SnowflakeGenerator, SnowflakeTimestamp,
        SnowflakeTimestampError, WorkerId,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-1-1 00:00);
    }

    #[test]
    fn legal_values() {
        for legal_timestamp in [0, 0xFFFF, 0x03FF_FFFF_FFFF] {
            assert!(SnowflakeTimestamp::<MillennialEpoch>::new(legal_timestamp).is_some());
        }
        for illegal_timestamp in [0x0400_0000_0000, u64::MAX] {
            assert!(SnowflakeTimestamp::<MillennialEpoch>::new(illegal_timestamp).is_none());
        }

        for legal_id in [0, 0xD, 0x1F] {
            assert!(WorkerId::new(legal_id).is_ok());
            assert!(ProcessId::new(legal_id).is_ok());
        }
        for illegal_id in [0x20, 0xF0, u8::MAX] {
            assert!(WorkerId::new(illegal_id).is_err());
            assert!(ProcessId::try_from(illegal_id).is_err());
        }
    }

    #[test]
    fn snowflake_timestamp() {
        let legal_date_times = [
            MillennialEpoch::EPOCH_TIME,
            utc_datetime!(2025-10-24 10:00),
            MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x03FF_FFFF_FFFF),
        ];

        for legal_date_time in legal_date_times {
            let timestamp =
                SnowflakeTimestamp::<MillennialEpoch>::try_from(legal_date_time).unwrap();
            assert_eq!(UtcDateTime::from(timestamp), legal_date_time);
        }

        assert_eq!(
            SnowflakeTimestamp::<MillennialEpoch>::try_from(
                MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)
            ),
            Err(SnowflakeTimestampError::TimeBeforeEpoch)
        );
        assert_eq!(
            SnowflakeTimestamp::<MillennialEpoch>::try_from(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimestampError::TimestampTooLarge)
        );
    }

    #[test]
    fn snowflake_from_parts() {
        let timestamp =
            SnowflakeTimestamp::<MillennialEpoch>::try_from(utc_datetime!(2025-10-24 10:30))
                .unwrap();
        let worker_id = WorkerId::new(0b10101).unwrap();
        let process_id = ProcessId::new(0b10001).unwrap();

        let snowflake =
            Snowflake::<MillennialEpoch>::from_parts(timestamp, worker_id, process_id, 100);

        assert_eq!(snowflake.get(), 3_416_751_341_570_822_244);
        assert_eq!(snowflake.timestamp(), timestamp);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.sequence(), 100);
    }

    #[test]
    fn generator_counts_within_a_millisecond() {
        let worker_id = WorkerId::new(10).unwrap();
        let process_id = ProcessId::new(0).unwrap();
        let time = utc_datetime!(2025-10-24 10:55);

        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(worker_id, process_id);

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();

        assert_eq!(first.timestamp(), second.timestamp());
        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_eq!(second.worker_id(), worker_id);

        let later = generator
            .generate_at(time + Duration::milliseconds(5))
            .unwrap();
        assert_eq!(later.sequence(), 0);
        assert!(later > second);
    }

    #[test]
    fn generator_never_repeats() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            WorkerId::default(),
            ProcessId::default(),
        );
        let time = utc_datetime!(2025-10-24 10:55);

        let mut previous = generator.generate_at(time).unwrap();
        // exhausts the sequence of one millisecond, then goes back in time
        for _ in 0..5000 {
            let next = generator.generate_at(time).unwrap();
            assert!(next > previous);
            previous = next;
        }
        let backwards = generator
            .generate_at(time - Duration::seconds(1))
            .unwrap();
        assert!(backwards > previous);
    }

    #[test]
    fn serializes_as_string() {
        let snowflake = Snowflake::<MillennialEpoch>::new(237_814_827_110_629_377);

        assert_eq!(
            serde_json::to_string(&snowflake).unwrap(),
            "\"237814827110629377\""
        );
        assert_eq!(
            serde_json::from_str::<Snowflake<MillennialEpoch>>("\"237814827110629377\"").unwrap(),
            snowflake
        );
        assert_eq!(
            serde_json::from_str::<Snowflake<MillennialEpoch>>("237814827110629377").unwrap(),
            snowflake
        );
        assert!(serde_json::from_str::<Snowflake<MillennialEpoch>>("\"12a\"").is_err());
        assert!(serde_json::from_str::<Snowflake<MillennialEpoch>>("-1").is_err());
    }
}
