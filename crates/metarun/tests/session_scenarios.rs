//! End-to-end behavior of a client session talking to a server over a
//! channel transport.

use std::sync::Arc;

use metarpc::ArgMeta;
use metarpc::Command;
use metarpc::HandleId;
use metarpc::Plain;
use metarpc::SessionId;

use metarun::Arg;
use metarun::ChannelTransport;
use metarun::Error;
use metarun::LocalObject;
use metarun::Remote;
use metarun::Server;
use metarun::Session;
use metarun::server::host::StaticHost;
use metarun::server::value::ObjectRef;
use metarun::server::value::Property;
use metarun::server::value::Throw;
use metarun::server::value::Value;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn desktop() -> StaticHost {
    let app = ObjectRef::new("App").with_method("getName", |_, _| Ok("desktop".into()));
    let web_contents = ObjectRef::new("WebContents").with_value("id", 2);
    let window = ObjectRef::new("BrowserWindow")
        .with_value("id", 7)
        .with_method("hide", |_, _| Ok(Value::Undefined));

    let looped = ObjectRef::array(vec![Value::from("head")]);
    looped.set("1", looped.clone().into()).ok();

    let failing = ObjectRef::new("Settings").with_getter("theme", |_, _| {
        let cause = ObjectRef::error("Error", "disk unavailable");
        let error = ObjectRef::error("Error", "settings are locked");
        error.define("cause", Property::data(cause.into()));
        Err(Throw(error.into()))
    });

    StaticHost::new()
        .with_builtin("app", app)
        .with_web_contents(web_contents)
        .with_window(window)
        .with_global("echo", ObjectRef::function("echo", |_, args| Ok(args.first().cloned().unwrap_or_default())))
        .with_global("looped", looped)
        .with_global("settings", failing)
        .with_global(
            "describe",
            ObjectRef::function("describe", |_, args| {
                let arg = args.first().cloned().unwrap_or_default();
                let me = arg.get_member("me")?;
                Ok(Value::Bool(me == Value::Null))
            }),
        )
}

fn connect(server: &Arc<Server>, id: u64) -> Session {
    let (transport, _pump) = ChannelTransport::spawn(server.clone());
    Session::new(SessionId(id), Arc::new(transport))
}

fn remote_exception(err: Error) -> metarun::RemoteException {
    match err {
        Error::Remote(exception) => exception,
        other => panic!("expected a remote exception, got {}", other),
    }
}

#[tokio::test]
async fn test_window_id_reads_by_value() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let id = session
        .commit(vec![Command::GetCurrentWindow, Command::MemberGet { name: "id".into() }])
        .await?;
    assert_eq!(id, Remote::Value(Plain::Number(7.0)));
    Ok(())
}

#[tokio::test]
async fn test_hide_on_third_issued_handle() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let _app = session.builtin("app").commit().await?;
    let _contents = session.current_web_contents().commit().await?;
    let window = session.current_window().commit().await?.into_object().unwrap();
    assert_eq!(window.id(), HandleId(3));

    let result = session
        .commit(vec![Command::RemoteObjectCall { id: HandleId(3), name: "hide".into(), args: vec![] }])
        .await?;
    assert!(result.is_undefined());
    Ok(())
}

#[tokio::test]
async fn test_assignment_to_never_issued_handle() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let err = session
        .commit(vec![Command::RemoteObjectSet {
            id: HandleId(404),
            name: "title".into(),
            value: ArgMeta::Value(Plain::from("x")),
        }])
        .await
        .unwrap_err();
    let exception = remote_exception(err);
    assert!(exception.is_protocol_error());
    assert!(exception.message.contains("404"));
    assert!(exception.message.contains("'title'"));
    Ok(())
}

#[tokio::test]
async fn test_by_value_kinds_survive_a_round_trip() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let cases: Vec<(Arg, Remote)> = vec![
        (Arg::undefined(), Remote::Value(Plain::Undefined)),
        (Arg::null(), Remote::Value(Plain::Null)),
        (true.into(), Remote::Value(Plain::Bool(true))),
        (0.1.into(), Remote::Value(Plain::Number(0.1))),
        ("héllo".into(), Remote::Value(Plain::from("héllo"))),
        (vec![0u8, 1, 127, 128, 255].into(), Remote::Buffer(vec![0, 1, 127, 128, 255])),
        (Arg::Date(1_700_000_000_123.0), Remote::Date(1_700_000_000_123.0)),
        (
            Arg::Array(vec![1.into(), "two".into(), Arg::Array(vec![])]),
            Remote::Array(vec![Remote::Value(Plain::from(1)), Remote::Value(Plain::from("two")), Remote::Array(vec![])]),
        ),
    ];
    for (arg, expected) in cases {
        let echoed = session.global("echo").call([arg])?.commit().await?;
        assert_eq!(echoed, expected);
    }
    Ok(())
}

#[tokio::test]
async fn test_identity_on_both_sides() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let window = session.current_window().commit().await?.into_object().unwrap();
    let echoed = session.global("echo").call([window.clone().into()])?.commit().await?;
    let echoed = echoed.into_object().unwrap();

    assert_eq!(echoed.id(), window.id());
    assert_eq!(echoed, window);
    Ok(())
}

#[tokio::test]
async fn test_cycles_break_to_null() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let looped = session.global("looped").commit().await?;
    assert_eq!(looped, Remote::Array(vec![Remote::Value(Plain::from("head")), Remote::Value(Plain::Null)]));

    let record = LocalObject::record().with("name", "loop");
    record.set("me", record.clone());
    let described = session.global("describe").call([record.into()])?.commit().await?;
    assert_eq!(described, Remote::Value(Plain::Bool(true)));
    Ok(())
}

#[tokio::test]
async fn test_thrown_error_keeps_message_and_cause() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let err = session.global("settings").get("theme").commit().await.unwrap_err();
    let exception = remote_exception(err);
    assert_eq!(exception.name, "Error");
    assert_eq!(exception.message, "settings are locked");
    assert!(exception.stack.starts_with("Error: settings are locked"));
    let cause = exception.cause.unwrap();
    assert_eq!(cause.as_error().unwrap().message(), Some("disk unavailable"));
    Ok(())
}

#[tokio::test]
async fn test_release_then_reuse_is_a_protocol_error() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());
    let session = connect(&server, 1);

    let window = session.current_window().commit().await?.into_object().unwrap();
    session.release().await?;

    let err = window.method("hide", [])?.commit().await.unwrap_err();
    let exception = remote_exception(err);
    assert!(exception.is_protocol_error());
    assert!(exception.message.ends_with("(released)"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_run_independently() -> anyhow::Result<()> {
    init_tracing();
    let server = Arc::new(Server::builder().host(desktop()).build());

    let mut tasks = Vec::new();
    for id in 1..=8 {
        let session = connect(&server, id);
        tasks.push(tokio::spawn(async move {
            let window = session.current_window().commit().await?.into_object().unwrap();
            let name = session.builtin("app").get("getName").call([])?.commit().await?;
            session.release().await?;
            Ok::<_, Error>((window.id(), name))
        }));
    }

    for task in tasks {
        let (id, name) = task.await??;
        assert_eq!(name.as_str(), Some("desktop"));
        assert_eq!(id, HandleId(1), "each session counts its own handles");
    }
    for id in 1..=8 {
        assert_eq!(server.registry().live_count(SessionId(id)), 0);
    }
    Ok(())
}
