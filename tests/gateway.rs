//! End-to-end tests against a mock app server on localhost

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use lpwan_gateway::protocol::schema::*;
use lpwan_gateway::protocol::state::raw_state;
use lpwan_gateway::protocol::{CommandId, Frame, FrameCodec, Inbound, Request};
use lpwan_gateway::{
    ClientHandle, Config, ConnectionManager, ConnectionState, DeviceDescriptor, Event,
    NetworkState,
};

const PAN_ID: u16 = 0xACDC;
const SENSOR_EXT: u64 = 0x00124B0008682C02;
const OTHER_EXT: u64 = 0x00124B0008682C03;
const WAIT: Duration = Duration::from_secs(2);

type AppServer = Framed<TcpStream, FrameCodec>;

type ClientTask = JoinHandle<lpwan_gateway::Result<()>>;

/// Starts a client the way the `gateway` binary does: subscribe, then run
async fn start() -> (TcpListener, ClientHandle, broadcast::Receiver<Event>, ClientTask) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = Config {
        peer_host: "127.0.0.1".to_string(),
        peer_port: listener.local_addr().unwrap().port(),
        reconnect_delay: Duration::from_millis(300),
        ..Config::default()
    };
    let (manager, handle) = ConnectionManager::new(config);
    let events = handle.subscribe();
    let task = tokio::spawn(manager.run());
    (listener, handle, events, task)
}

async fn accept(listener: &TcpListener) -> AppServer {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    Framed::new(stream, FrameCodec::new())
}

async fn expect_request(server: &mut AppServer) -> Request {
    let frame = timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
    Request::decode(&frame).unwrap()
}

async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
    timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

async fn assert_no_event(events: &mut broadcast::Receiver<Event>) {
    assert!(timeout(Duration::from_millis(200), events.recv()).await.is_err());
}

async fn reply(server: &mut AppServer, message: Inbound) {
    server.send(message.to_frame()).await.unwrap();
}

fn descriptor(short: u32, ext: u64) -> MacDeviceDescriptor {
    MacDeviceDescriptor {
        pan_id: PAN_ID as u32,
        short_address: short,
        ext_address: ext,
    }
}

fn started_confirm() -> Inbound {
    Inbound::NetworkInfoConfirm(GetNwkInfoCnf {
        cmd_id: CommandId::GetNwkInfoCnf.as_u8() as u32,
        status: NWK_INFO_STATUS_STARTED,
        nwkinfo: Some(AppsrvNwkInfo {
            nwk_info: Some(LlcNetInfo {
                dev_info: Some(descriptor(0xAABB, 0x00124B0000000001)),
                channel: 0,
                fh: false,
                fh_channels: vec![],
            }),
            security_enabled: true,
            network_mode: 2,
            state: raw_state::STARTED,
        }),
    })
}

fn device_array() -> Inbound {
    device_array_of(vec![(0x0001, SENSOR_EXT, false), (0x0002, OTHER_EXT, true)])
}

/// Device array from `(short, ext, mains_powered)` entries
fn device_array_of(entries: Vec<(u32, u64, bool)>) -> Inbound {
    Inbound::DeviceArrayConfirm(GetDeviceArrayCnf {
        cmd_id: CommandId::GetDeviceArrayCnf.as_u8() as u32,
        status: 0,
        dev_info: entries
            .into_iter()
            .map(|(short, ext, mains)| AppsrvDeviceInfo {
                dev_info: Some(descriptor(short, ext)),
                cap_info: Some(MacCapabilityInfo {
                    ffd: mains,
                    mains_power: mains,
                    rx_on_when_idle: mains,
                    ..MacCapabilityInfo::default()
                }),
            })
            .collect(),
    })
}

fn temperature_report() -> Inbound {
    Inbound::DeviceDataRxIndication(DeviceDataRxInd {
        cmd_id: CommandId::DeviceDataRxInd.as_u8() as u32,
        src_addr: Some(MacAddress {
            addr_mode: addr_mode::EXTENDED,
            short_addr: 0,
            ext_address: SENSOR_EXT,
        }),
        rssi: -58,
        s_data_msg: Some(SensorMsg {
            cmd_id: sensor_cmd::SENSOR_DATA,
            ext_address: SENSOR_EXT,
            frame_control: data_fields::TEMP_SENSOR,
            temp_sensor: Some(TempSensorField {
                ambience_temp: 22,
                object_temp: 24,
            }),
            light_sensor: None,
            humidity_sensor: None,
        }),
        s_config_msg: None,
    })
}

/// Walks the connect handshake up to a synced device list
async fn sync(server: &mut AppServer, events: &mut broadcast::Receiver<Event>) {
    sync_with(server, events, device_array(), 2).await;
}

async fn sync_with(
    server: &mut AppServer,
    events: &mut broadcast::Receiver<Event>,
    array: Inbound,
    expected: usize,
) {
    assert_eq!(expect_request(server).await, Request::GetNetworkInfo);

    reply(server, started_confirm()).await;
    match next_event(events).await {
        Event::NetworkUpdated(info) => {
            assert_eq!(info.state, NetworkState::Started);
            assert_eq!(info.pan_coordinator.pan_id, PAN_ID);
            assert!(info.security_enabled);
        }
        other => panic!("expected network update, got {:?}", other),
    }
    assert_eq!(expect_request(server).await, Request::GetDeviceArray);

    reply(server, array).await;
    match next_event(events).await {
        Event::DeviceListUpdated(devices) => assert_eq!(devices.len(), expected),
        other => panic!("expected device list, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sync_then_reconnect() {
    let (listener, handle, mut events, task) = start().await;

    let mut server = accept(&listener).await;
    handle.wait_for_state(ConnectionState::Connected).await.unwrap();
    sync(&mut server, &mut events).await;
    // A device array produces exactly one list update
    assert_no_event(&mut events).await;

    let info = handle.network_info().await.unwrap().unwrap();
    assert_eq!(info.pan_coordinator.short_address, 0xAABB);

    drop(server);
    handle.wait_for_state(ConnectionState::ReconnectPending).await.unwrap();
    // Cached state survives the outage
    assert_eq!(handle.devices().await.unwrap().len(), 2);

    let mut server = accept(&listener).await;
    handle.wait_for_state(ConnectionState::Connected).await.unwrap();

    // The peer's device set changed while the client was away
    const NEW_EXT: u64 = 0x00124B0008682C09;
    let array = device_array_of(vec![(0x0001, SENSOR_EXT, false), (0x0007, NEW_EXT, false)]);
    sync_with(&mut server, &mut events, array, 2).await;
    assert_no_event(&mut events).await;

    let devices = handle.devices().await.unwrap();
    let addresses: Vec<(u16, u64)> = devices.iter().map(|d| (d.short_address, d.ext_address)).collect();
    assert_eq!(addresses, vec![(0x0001, SENSOR_EXT), (0x0007, NEW_EXT)]);
    assert!(devices.iter().all(|d| d.ext_address != OTHER_EXT));

    handle.shutdown().await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unsolicited_first_update_is_delivered() {
    let (listener, handle, mut events, task) = start().await;
    let mut server = accept(&listener).await;

    // Answer before reading the client's request
    reply(&mut server, started_confirm()).await;
    assert!(matches!(next_event(&mut events).await, Event::NetworkUpdated(_)));

    handle.shutdown().await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_sensor_report_and_device_requests() {
    let (listener, handle, mut events, task) = start().await;
    let mut server = accept(&listener).await;
    sync(&mut server, &mut events).await;

    reply(&mut server, temperature_report()).await;
    match next_event(&mut events).await {
        Event::DeviceListUpdated(devices) => {
            let sensor = devices.iter().find(|d| d.ext_address == SENSOR_EXT).unwrap();
            let readings = sensor.sensor_readings.unwrap();
            let temperature = readings.temperature.unwrap();
            assert_eq!(temperature.ambience_temp, 22);
            assert_eq!(temperature.object_temp, 24);
            assert!(readings.light.is_none());
            assert!(readings.humidity.is_none());
            assert_eq!(sensor.rssi, Some(-58));
            assert!(sensor.last_seen.is_some());

            let other = devices.iter().find(|d| d.ext_address == OTHER_EXT).unwrap();
            assert!(other.sensor_readings.is_none());
        }
        other => panic!("expected device list, got {:?}", other),
    }

    let sensor = DeviceDescriptor {
        pan_id: PAN_ID,
        short_address: 0x0001,
        ext_address: SENSOR_EXT,
    };

    handle.send_toggle(0x0001).await.unwrap();
    assert_eq!(
        expect_request(&mut server).await,
        Request::SendToggle { target: sensor }
    );

    handle.send_config(0x0001, 90_000, 3_000).await.unwrap();
    assert_eq!(
        expect_request(&mut server).await,
        Request::SendConfig {
            target: sensor,
            reporting_interval_ms: 90_000,
            polling_interval_ms: 3_000,
        }
    );

    handle.set_join_permit(true).await.unwrap();
    assert_eq!(
        expect_request(&mut server).await,
        Request::SetJoinPermit { duration: JOIN_PERMIT_ALWAYS_OPEN }
    );
    reply(
        &mut server,
        Inbound::SetJoinPermitConfirm(SetJoinPermitCnf {
            cmd_id: CommandId::SetJoinPermitCnf.as_u8() as u32,
            status: 0,
        }),
    )
    .await;
    assert_eq!(next_event(&mut events).await, Event::JoinPermitConfirmed { status: 0 });

    // Unknown targets are dropped without sending anything
    handle.send_toggle(0x0099).await.unwrap();
    handle.request_network_info().await.unwrap();
    assert_eq!(expect_request(&mut server).await, Request::GetNetworkInfo);

    handle.shutdown().await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_bad_frames_do_not_drop_connection() {
    let (listener, handle, mut events, task) = start().await;
    let mut server = accept(&listener).await;
    assert_eq!(expect_request(&mut server).await, Request::GetNetworkInfo);

    // State change with no network record yet
    reply(
        &mut server,
        Inbound::CollectorStateChangeIndication(CollectorStateCngUpdateInd {
            cmd_id: CommandId::CollectorStateCngInd.as_u8() as u32,
            state: raw_state::STARTED,
        }),
    )
    .await;
    // Unassigned command id, foreign subsystem and a garbage payload
    server.send(Frame::new(200, Vec::new())).await.unwrap();
    server
        .send(Frame {
            subsystem: 7,
            ..Frame::new(CommandId::GetNwkInfoCnf.as_u8(), Vec::new())
        })
        .await
        .unwrap();
    server
        .send(Frame::new(CommandId::GetNwkInfoCnf.as_u8(), vec![0xFF, 0xFF, 0xFF]))
        .await
        .unwrap();
    assert_no_event(&mut events).await;

    reply(&mut server, started_confirm()).await;
    assert!(matches!(next_event(&mut events).await, Event::NetworkUpdated(_)));
    assert_eq!(expect_request(&mut server).await, Request::GetDeviceArray);
    assert_eq!(handle.connection_state(), ConnectionState::Connected);

    handle.shutdown().await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_requests_while_disconnected_are_dropped() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config {
        peer_port: port,
        reconnect_delay: Duration::from_millis(50),
        ..Config::default()
    };
    let (handle, task) = lpwan_gateway::spawn(config);
    handle.wait_for_state(ConnectionState::ReconnectPending).await.unwrap();

    handle.set_join_permit(false).await.unwrap();
    handle.send_toggle(0x0001).await.unwrap();
    assert!(handle.network_info().await.unwrap().is_none());

    handle.shutdown().await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}
