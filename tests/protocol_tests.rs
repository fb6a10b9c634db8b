use obsbus::protocol::*;

#[test]
fn test_error_reply_lines_carry_stable_codes() {
    let cases = [
        (ErrorKind::System, -1),
        (ErrorKind::ParamsNum, -2),
        (ErrorKind::ParamsVal, -3),
        (ErrorKind::Command, -4),
        (ErrorKind::Hw, -5),
    ];
    for (kind, code) in cases {
        let line = format_reply(&Reply::Err(WireError::new(kind, "detail")));
        assert_eq!(line, format!("-ERR {code} detail"));
        match parse_reply(&line).unwrap() {
            Reply::Err(err) => assert_eq!(err.kind, kind),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}

#[test]
fn test_argument_validation_taxonomy() {
    // Wrong count is PARAMSNUM; present but bad value is PARAMSVAL
    let cmd = parse_command_line("expose 0 abc").unwrap();
    assert!(cmd.require_args(2).is_ok());
    assert_eq!(cmd.require_args(1).unwrap_err().kind, ErrorKind::ParamsNum);
    assert_eq!(cmd.arg_f64(1).unwrap_err().kind, ErrorKind::ParamsVal);
    assert_eq!(cmd.arg_i64(0).unwrap(), 0);
}

#[test]
fn test_command_format_and_parse_are_inverse() {
    let rendered = format_command("expose", &["0".to_string(), "2.5".to_string()]);
    assert_eq!(rendered, "expose 0 2.5");
    let parsed = parse_command_line(&rendered).unwrap();
    assert_eq!(parsed.verb, "expose");
    assert_eq!(parsed.args, vec!["0", "2.5"]);

    assert_eq!(format_command("ready", &[]), "ready");
}

#[test]
fn test_push_lines_distinguished_from_replies() {
    // A monitoring peer must be able to classify every inbound line
    let lines = [
        format_reply(&Reply::Ok(Some("3".to_string()))),
        format_state_line(0x13),
        format_value_line("SC_CAM0", "E 10"),
    ];

    assert!(parse_reply(&lines[0]).is_ok());
    assert!(parse_push(&lines[0]).is_err());

    assert!(parse_reply(&lines[1]).is_err());
    assert_eq!(parse_push(&lines[1]).unwrap(), Push::MasterState(0x13));

    assert_eq!(
        parse_push(&lines[2]).unwrap(),
        Push::Value { name: "SC_CAM0".to_string(), value: "E 10".to_string() }
    );
}

#[test]
fn test_ok_reply_with_multiword_value() {
    let reply = Reply::Ok(Some("DOME 2 ready".to_string()));
    assert_eq!(parse_reply(&format_reply(&reply)).unwrap(), reply);
}

#[test]
fn test_malformed_lines_rejected() {
    assert!(parse_reply("OK").is_err());
    assert!(parse_reply("-ERR notanumber message").is_err());
    assert!(parse_push("X 1 2").is_err());
    assert!(parse_command_line("").is_err());
}
