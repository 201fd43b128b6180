use std::time::Duration;

use crate::{CaseOutcome, FailureCause, IsolationError, Timings};

/// Size of the record a worker sends back: a tag byte and three little-endian `u64`s.
pub(crate) const RECORD_LEN: usize = 25;

const TAG_COMPLETED: u8 = 0;
const TAG_OUT_OF_MEMORY: u8 = 1;

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Serializes the outcome of a case for the harness process.
///
/// Any failure is sent as out of memory, since that is the only way a case can fail inside
/// the worker without the worker itself dying.
pub(crate) fn encode_record(outcome: &CaseOutcome) -> [u8; RECORD_LEN] {
    let mut record = [0_u8; RECORD_LEN];

    match outcome {
        CaseOutcome::Completed(timings) => {
            record[0] = TAG_COMPLETED;
            record[1..9].copy_from_slice(&nanos(timings.system()).to_le_bytes());
            record[9..17].copy_from_slice(&nanos(timings.user()).to_le_bytes());
            record[17..25].copy_from_slice(&nanos(timings.wall()).to_le_bytes());
        }
        CaseOutcome::Failed(_) => record[0] = TAG_OUT_OF_MEMORY,
    }

    record
}

fn read_duration(bytes: &[u8]) -> Duration {
    let mut raw = [0_u8; 8];
    raw.copy_from_slice(bytes);
    Duration::from_nanos(u64::from_le_bytes(raw))
}

/// Reads back the outcome a worker sent.
pub(crate) fn decode_record(bytes: &[u8]) -> Result<CaseOutcome, IsolationError> {
    let Ok(record) = <&[u8; RECORD_LEN]>::try_from(bytes) else {
        return Err(IsolationError::TruncatedRecord {
            received: bytes.len(),
        });
    };

    match record[0] {
        TAG_COMPLETED => Ok(CaseOutcome::Completed(Timings::new(
            read_duration(&record[1..9]),
            read_duration(&record[9..17]),
            read_duration(&record[17..25]),
        ))),
        TAG_OUT_OF_MEMORY => Ok(CaseOutcome::Failed(FailureCause::OutOfMemory)),
        tag => Err(IsolationError::UnknownTag { tag }),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn completed_layout() {
        let outcome = CaseOutcome::Completed(Timings::new(
            Duration::from_nanos(1),
            Duration::from_nanos(0x0102),
            Duration::from_secs(1),
        ));

        let record = encode_record(&outcome);

        assert_eq!(record[0], 0);
        assert_eq!(record[1..9], [1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(record[9..17], [2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            u64::from_le_bytes(record[17..25].try_into().unwrap()),
            1_000_000_000
        );
        assert_eq!(decode_record(&record).unwrap(), outcome);
    }

    #[test]
    fn failure_layout() {
        let record = encode_record(&CaseOutcome::Failed(FailureCause::OutOfMemory));

        assert_eq!(record[0], 1);
        assert!(record[1..].iter().all(|&byte| byte == 0));
        assert_eq!(
            decode_record(&record).unwrap(),
            CaseOutcome::Failed(FailureCause::OutOfMemory)
        );
    }

    #[test]
    fn short_record_is_rejected() {
        let record = encode_record(&CaseOutcome::Failed(FailureCause::OutOfMemory));

        assert!(matches!(
            decode_record(&record[..10]),
            Err(IsolationError::TruncatedRecord { received: 10 })
        ));
        assert!(matches!(
            decode_record(&[]),
            Err(IsolationError::TruncatedRecord { received: 0 })
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut record = [0_u8; RECORD_LEN];
        record[0] = 7;

        assert!(matches!(
            decode_record(&record),
            Err(IsolationError::UnknownTag { tag: 7 })
        ));
    }
}
