use super::*;

#[test]
fn short_truncates_long_strings() {
    assert_eq!("abcdef".short(3), "abc");
    assert_eq!("ab".short(3), "ab");
}

#[test]
fn job_id_roundtrips_through_string() {
    let id = JobId::new("job-123");
    assert_eq!(id.as_str(), "job-123");
    assert_eq!(id, "job-123");
    assert_eq!(id.to_string(), "job-123");
}

#[test]
fn sequential_id_gen_is_monotonic_and_unique() {
    let gen = SequentialIdGen::new("task");
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert!(a.starts_with("task-"));
}

#[test]
fn uuid_id_gen_produces_distinct_ids() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}
