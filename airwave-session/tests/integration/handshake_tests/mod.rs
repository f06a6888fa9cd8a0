mod test_candidates_before_answer;
mod test_malformed_payload_dropped;
mod test_remote_leave_evicts_peer;
mod test_unknown_kind_ignored;
