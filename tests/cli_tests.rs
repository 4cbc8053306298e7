#[cfg(test)]
mod tests {
    use clap::Parser;
    use netmidirec::*;
    use std::path::PathBuf;

    #[test]
    fn test_args_without_flags() {
        let args = Args::parse_from(["test"]);
        assert_eq!(args.address, None);
        assert_eq!(args.port, None);
        assert!(!args.multicast);
        assert!(!args.merge_senders);
        assert!(!args.inline_sessions);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_with_short_flags() {
        let args = Args::parse_from([
            "test", "-a", "0.0.0.0", "-p", "5004", "-i", "2.5", "-b", "120", "-q", "480", "-n",
            "4", "-o", "/tmp/takes", "-v",
        ]);
        assert_eq!(args.address, Some("0.0.0.0".to_string()));
        assert_eq!(args.port, Some(5004));
        assert_eq!(args.inactivity, Some(2.5));
        assert_eq!(args.bpm, Some(120.0));
        assert_eq!(args.ppqn, Some(480));
        assert_eq!(args.min_events, Some(4));
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/takes")));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_with_modes() {
        let args = Args::parse_from([
            "test",
            "--resolution",
            "beats",
            "--note-mode",
            "independent",
            "--tick-reference",
            "delta",
            "--pitch",
            "unsigned",
            "--merge-senders",
        ]);
        assert_eq!(args.resolution.as_deref(), Some("beats"));
        assert_eq!(args.note_mode.as_deref(), Some("independent"));
        assert_eq!(args.tick_reference.as_deref(), Some("delta"));
        assert_eq!(args.pitch.as_deref(), Some("unsigned"));
        assert!(args.merge_senders);
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        assert!(Args::try_parse_from(["test", "--note-mode", "chords"]).is_err());
        assert!(Args::try_parse_from(["test", "--resolution", "seconds"]).is_err());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Args::try_parse_from(["test", "--port", "70000"]).is_err());
    }
}
