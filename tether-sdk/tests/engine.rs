//! Connection life-cycle tests against an in-memory transport.
//!
//! Tests cover:
//! - Registration order and life-cycle events
//! - Attempt ceiling and its reset on connect()
//! - Auto-join delay and spacing, keepalive PINGs
//! - Failure handling: refused, read errors, EOF, write errors
//! - Line framing across reads, malformed lines, dispatch ordering

mod common;

use std::io;

use common::{ManualClock, Mock, client, config, drain, lifecycle, lines_for};
use tether_sdk::config::EngineConfig;
use tether_sdk::registry::{DEBUG_CHANNEL, NOTICE_CHANNEL, STATUS_CHANNEL};
use tether_sdk::transport::TlsStatus;
use tether_sdk::{Command, ConfigError, Event, State, UserCommand};

fn connecting() -> Event {
    Event::Connecting {
        endpoint: "irc.test:6667".to_string(),
    }
}

#[test]
fn registration_is_pass_nick_user() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);

    client
        .connect(EngineConfig {
            server_password: Some("hunter2".into()),
            ..config()
        })
        .unwrap();

    assert_eq!(client.state(), State::Connected);
    assert_eq!(
        mock.take_sent(),
        vec!["PASS :hunter2", "NICK :jeb", "USER jeb 8 * :jeb"]
    );
    let events = drain(&mut client);
    assert_eq!(lifecycle(&events), vec![connecting(), Event::Connected]);
    assert_eq!(
        lines_for(&events, NOTICE_CHANNEL),
        vec!["Connecting to server irc.test:6667...", "Server connection established."]
    );
}

#[test]
fn username_and_empty_password() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);

    client
        .connect(EngineConfig {
            user: Some("kerman".into()),
            server_password: Some(String::new()),
            ..config()
        })
        .unwrap();
    assert_eq!(mock.take_sent(), vec!["NICK :jeb", "USER kerman 8 * :jeb"]);
}

#[test]
fn invalid_config_never_opens_a_socket() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);

    let result = client.connect(EngineConfig {
        nick: String::new(),
        ..config()
    });
    assert_eq!(result, Err(ConfigError::MissingNick));
    assert_eq!(mock.opens(), 0);
    let events = drain(&mut client);
    assert_eq!(lines_for(&events, STATUS_CHANNEL).len(), 2);
    assert!(lifecycle(&events).is_empty());
}

#[test]
fn failed_connect_retries_once() {
    let mock = Mock::default();
    mock.refuse(true);
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);

    client.connect(config()).unwrap();

    assert_eq!(mock.opens(), 2);
    assert_eq!(client.state(), State::Disconnected);
    assert_eq!(client.engine().attempts(), 2);
    let events = lifecycle(&drain(&mut client));
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], connecting());
    assert!(matches!(events[1], Event::ConnectionFailed { .. }));
    assert_eq!(events[2], connecting());
    assert!(matches!(events[3], Event::ConnectionFailed { .. }));
}

#[test]
fn sixth_attempt_is_refused_without_touching_the_socket() {
    let mock = Mock::default();
    mock.refuse(true);
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);

    client.connect(config()).unwrap();
    client.reconnect();
    client.reconnect();
    client.reconnect();
    assert_eq!(mock.opens(), 5);
    drain(&mut client);

    client.reconnect();
    assert_eq!(mock.opens(), 5);
    let events = lifecycle(&drain(&mut client));
    assert_eq!(events, vec![connecting(), Event::ConnectionAttemptsExceeded]);

    client.reconnect();
    assert_eq!(mock.opens(), 5);
    let events = drain(&mut client);
    assert!(events.contains(&Event::ConnectionAttemptsExceeded));
    assert_eq!(
        lines_for(&events, NOTICE_CHANNEL).last().map(String::as_str),
        Some("Connection attempts exceeded. Change config before retrying.")
    );

    // A fresh connect() restores the budget.
    mock.refuse(false);
    client.connect(config()).unwrap();
    assert_eq!(mock.opens(), 6);
    assert_eq!(client.state(), State::Connected);
    assert_eq!(client.engine().attempts(), 1);
}

#[test]
fn auto_join_waits_five_seconds() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    mock.take_sent();

    for offset in [0, 1000, 2500, 4999] {
        clock.at(offset);
        client.tick();
        assert!(mock.take_sent().is_empty(), "joined early at +{offset}ms");
    }

    clock.at(5000);
    client.tick();
    assert_eq!(mock.take_sent(), vec!["JOIN #a", "JOIN #b"]);

    for offset in [5001, 10_000, 29_000] {
        clock.at(offset);
        client.tick();
        assert!(mock.take_sent().is_empty(), "joined twice at +{offset}ms");
    }
}

#[test]
fn auto_join_rounds_are_thirty_seconds_apart() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();

    clock.at(5000);
    client.tick();
    let joins = |sent: Vec<String>| sent.into_iter().filter(|l| l.starts_with("JOIN")).count();
    assert_eq!(joins(mock.take_sent()), 2);

    // Connection drops and comes straight back.
    clock.at(6000);
    mock.fail_next_read(io::ErrorKind::ConnectionReset);
    client.tick();
    assert_eq!(client.state(), State::Connected);
    assert_eq!(mock.opens(), 2);

    clock.at(11_000);
    client.tick();
    assert_eq!(joins(mock.take_sent()), 0);

    clock.at(34_999);
    client.tick();
    assert_eq!(joins(mock.take_sent()), 0);

    clock.at(35_000);
    client.tick();
    assert_eq!(joins(mock.take_sent()), 2);
}

#[test]
fn keepalive_ping_after_thirty_seconds() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client
        .connect(EngineConfig {
            channels: String::new(),
            ..config()
        })
        .unwrap();
    mock.take_sent();

    clock.at(30_000);
    client.tick();
    assert!(mock.take_sent().is_empty());

    clock.at(30_001);
    client.tick();
    assert_eq!(mock.take_sent(), vec!["PING :1030001"]);

    clock.at(45_000);
    client.tick();
    assert!(mock.take_sent().is_empty());

    clock.at(60_002);
    client.tick();
    assert_eq!(mock.take_sent(), vec!["PING :1060002"]);
}

#[test]
fn write_failure_reconnects() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    mock.take_sent();
    drain(&mut client);

    mock.fail_next_write();
    client.submit_input("/whois bob");

    assert_eq!(client.state(), State::Connected);
    assert_eq!(mock.opens(), 2);
    assert_eq!(mock.closes(), 1);
    assert_eq!(
        mock.take_sent(),
        vec!["QUIT :Build. Fly. Dream.", "NICK :jeb", "USER jeb 8 * :jeb"]
    );
    let events = lifecycle(&drain(&mut client));
    assert!(matches!(events[0], Event::ConnectionFailed { .. }));
    assert_eq!(events[1..], [Event::Disconnected, connecting(), Event::Connected]);
}

#[test]
fn end_of_stream_is_a_failure() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    drain(&mut client);

    mock.fail_next_read(io::ErrorKind::UnexpectedEof);
    mock.refuse(true);
    client.tick();

    assert_eq!(client.state(), State::Disconnected);
    let events = lifecycle(&drain(&mut client));
    assert!(matches!(events[0], Event::ConnectionFailed { .. }));
    assert_eq!(events[1], Event::Disconnected);
    assert_eq!(events[2], connecting());
    assert!(matches!(events[3], Event::ConnectionFailed { .. }));
    assert_eq!(events.len(), 4);
}

#[test]
fn disconnect_sends_quit_and_stays_down() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    mock.take_sent();
    drain(&mut client);

    client.disconnect();
    assert_eq!(mock.take_sent(), vec!["QUIT :Build. Fly. Dream."]);
    assert_eq!(lifecycle(&drain(&mut client)), vec![Event::Disconnected]);

    client.reconnect();
    clock.at(60_000);
    client.tick();
    assert_eq!(mock.opens(), 1);
    assert!(drain(&mut client).is_empty());

    // Sending while down is dropped quietly.
    client.submit_input("/whois bob");
    assert!(mock.take_sent().is_empty());
}

#[test]
fn certificate_problem_is_a_warning() {
    let mock = Mock::default();
    mock.tls(TlsStatus::CertificateRejected("certificate expired".into()));
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(EngineConfig { secure: true, ..config() }).unwrap();

    assert_eq!(client.state(), State::Connected);
    let events = drain(&mut client);
    assert_eq!(
        lifecycle(&events),
        vec![
            connecting(),
            Event::SslCertificateError {
                reason: "certificate expired".into()
            },
            Event::SslConnected,
            Event::Connected,
        ]
    );
    assert!(
        lines_for(&events, NOTICE_CHANNEL)
            .contains(&"SSL Certificate error - use this server at your own risk.".to_string())
    );
}

#[test]
fn lines_split_across_reads_and_ticks() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    mock.take_sent();

    mock.push("PING :1\r\nPI");
    mock.push("NG :2\r\n");
    client.tick();
    assert_eq!(mock.take_sent(), vec!["PONG :1", "PONG :2"]);

    mock.push("PING :3\r");
    client.tick();
    assert!(mock.take_sent().is_empty());
    mock.push("\nPING :4\r\n");
    client.tick();
    assert_eq!(mock.take_sent(), vec!["PONG :3", "PONG :4"]);
}

#[test]
fn utf8_split_inside_a_character() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    drain(&mut client);

    let wire = ":bob!b@h PRIVMSG #a :Grüße ✓\r\n".as_bytes();
    let mid = wire.iter().position(|&b| b == 0xC3).unwrap() + 1;
    mock.push_bytes(&wire[..mid]);
    client.tick();
    mock.push_bytes(&wire[mid..]);
    client.tick();

    let events = drain(&mut client);
    assert_eq!(lines_for(&events, "#a"), vec!["Grüße ✓"]);
}

#[test]
fn malformed_lines_are_skipped() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    mock.take_sent();

    mock.push("\r\n:lonely\r\n12 nope\r\nPING :5\r\n");
    client.tick();
    assert_eq!(client.state(), State::Connected);
    assert_eq!(mock.take_sent(), vec!["PONG :5"]);
}

#[test]
fn each_line_is_fully_handled_before_the_next() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    drain(&mut client);

    mock.push(":bob!b@h JOIN #a\r\n:bob!b@h PART #a :later\r\n");
    client.tick();

    let order: Vec<String> = drain(&mut client)
        .into_iter()
        .filter_map(|e| match e {
            Event::CommandReceived(cmd) => Some(format!("recv {}", cmd.command)),
            Event::Line { line, .. } => Some(line.text),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            "recv JOIN",
            "bob has joined #a",
            "recv PART",
            "bob has left #a (later)",
        ]
    );
}

#[test]
fn names_burst_orders_members() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();

    mock.push(":srv 353 jeb = #a :carol +bob @alice\r\n:srv 366 jeb #a :End of /NAMES list.\r\n");
    client.tick();

    let users: Vec<String> = client
        .registry()
        .channel("#a")
        .unwrap()
        .users()
        .iter()
        .map(|u| u.to_string())
        .collect();
    assert_eq!(users, vec!["@alice", "+bob", "carol"]);
}

#[test]
fn debug_mode_echoes_both_directions() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(EngineConfig { debug: true, ..config() }).unwrap();
    mock.push(":srv 001 jeb :Welcome\r\nPING :7\r\n");
    client.tick();

    let echoed: Vec<String> = client
        .registry()
        .channel(DEBUG_CHANNEL)
        .unwrap()
        .backlog()
        .map(|l| format!("{} {}", l.sender, l.text))
        .collect();
    assert_eq!(
        echoed,
        vec![
            "CLIENT NICK :jeb",
            "CLIENT USER jeb 8 * :jeb",
            "SERVER (unknown) :srv 001 jeb :Welcome",
            "SERVER PING :7",
            "CLIENT PONG :7",
        ]
    );
}

#[test]
fn closing_a_channel_parts_it() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();

    mock.push(":jeb!j@h JOIN #a\r\n:bob!b@h PRIVMSG jeb :hi\r\n");
    client.tick();
    mock.take_sent();
    assert!(client.focus("#a"));

    assert!(client.close_channel("#a"));
    assert_eq!(mock.take_sent(), vec!["PART :#a"]);
    assert!(client.registry().channel("#a").is_none());
    assert!(client.registry().current().is_some());

    assert!(client.close_channel("bob"));
    assert!(mock.take_sent().is_empty());
    assert!(!client.close_channel("bob"));
}

#[test]
fn sent_commands_are_reported_before_writing() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    drain(&mut client);

    mock.push(":srv 353 jeb = #a :jeb\r\n:jeb!j@h JOIN #a\r\n");
    client.tick();
    assert!(client.focus("#a"));
    client.submit_input("hello");

    let sent: Vec<Command> = drain(&mut client)
        .into_iter()
        .filter_map(|e| match e {
            Event::CommandSent(cmd) => Some(cmd),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![Command::new("PRIVMSG", vec!["#a", "hello"])]);
}

#[test]
fn embedded_line_breaks_never_reach_the_wire() {
    let mock = Mock::default();
    let clock = ManualClock::new();
    let mut client = client(&mock, &clock);
    client.connect(config()).unwrap();
    mock.take_sent();

    client.submit_input("/msg bob hi\r\nQUIT :gone");
    client.submit_input("/whois bob\r\nPRIVMSG nickserv :identify x");
    assert_eq!(mock.take_sent(), vec!["PRIVMSG bob :hi", "WHOIS bob"]);
    drain(&mut client);

    // Commands built without going through input parsing are refused whole.
    client.handle_user_command(UserCommand::new("MSG", "bob hi\r\nQUIT :gone"));
    client.handle_user_command(UserCommand::new("WHOIS", "bob\nQUIT"));
    assert!(mock.take_sent().is_empty());

    let events = drain(&mut client);
    assert!(!events.iter().any(|e| matches!(e, Event::CommandSent(_))));
    assert_eq!(client.state(), State::Connected);
    assert_eq!(mock.opens(), 1);
}

#[test]
fn events_serialize_with_type_tags() {
    let json = serde_json::to_value(&Event::ConnectionFailed {
        reason: "refused".into(),
    })
    .unwrap();
    assert_eq!(json["type"], "connection_failed");
    assert_eq!(json["data"]["reason"], "refused");

    let json = serde_json::to_value(&Event::CommandSent(Command::new("NICK", vec!["jeb"]))).unwrap();
    assert_eq!(json["data"]["command"], "NICK");
}
