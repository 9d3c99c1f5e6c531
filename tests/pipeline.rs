// Loopback tests of the three processes talking over real TCP sockets

use std::io::Cursor;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use obstacle_avoid_runtime::actuator::{ActuatorExit, MotorActuator};
use obstacle_avoid_runtime::decision::{Classifier, DecisionEngine, EngineExit};
use obstacle_avoid_runtime::motor::{
    ActuatorState, DriveSettings, HardwareCapability, MotorDriver, MotorEffort,
};
use obstacle_avoid_runtime::net::{LineReader, ReadLine, send_line};
use obstacle_avoid_runtime::sensor::{ReplaySource, SensorStreamer, StreamEnd};

const READ_TIMEOUT: Duration = Duration::from_millis(50);

fn local_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").unwrap()
}

/// Read lines until `count` arrived or the peer closed
fn read_lines(reader: &mut LineReader, count: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for _ in 0..200 {
        if lines.len() == count {
            break;
        }
        match reader.read_line().unwrap() {
            ReadLine::Line(line) => lines.push(line),
            ReadLine::Idle => continue,
            ReadLine::Closed => break,
        }
    }
    lines
}

fn wait_closed(reader: &mut LineReader) -> bool {
    for _ in 0..200 {
        match reader.read_line().unwrap() {
            ReadLine::Closed => return true,
            ReadLine::Idle => continue,
            ReadLine::Line(line) => panic!("unexpected line {:?}", line),
        }
    }
    false
}

fn simulated_actuator() -> MotorActuator {
    MotorActuator::new(MotorDriver::new(
        HardwareCapability::Unavailable("loopback test".into()),
        DriveSettings::default(),
    ))
}

#[test]
fn cancelling_engine_sends_stop_then_exit() {
    // Stand-in actuator: just a socket we read commands from
    let actuator_listener = local_listener();
    let actuator_stream = TcpStream::connect(actuator_listener.local_addr().unwrap()).unwrap();
    let (actuator_side, _) = actuator_listener.accept().unwrap();
    let mut commands = LineReader::new(actuator_side, READ_TIMEOUT).unwrap();

    let sensor_listener = local_listener();
    let sensor_addr = sensor_listener.local_addr().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let engine_running = Arc::clone(&running);
    let engine = thread::spawn(move || {
        let mut engine = DecisionEngine::new(actuator_stream, Classifier::default());
        engine.run(sensor_listener, &engine_running).unwrap()
    });

    let mut sensor = TcpStream::connect(sensor_addr).unwrap();
    send_line(&mut sensor, "10,500\nabc,xyz\n\n0,100\n").unwrap();

    // The malformed record and the blank line produce nothing
    assert_eq!(read_lines(&mut commands, 2), vec!["forward", "stop"]);

    running.store(false, Ordering::SeqCst);
    assert_eq!(engine.join().unwrap(), EngineExit::Cancelled);

    assert_eq!(read_lines(&mut commands, 2), vec!["stop", "exit"]);
    assert!(wait_closed(&mut commands));
}

#[test]
fn engine_keeps_running_after_malformed_records() {
    let actuator_listener = local_listener();
    let actuator_stream = TcpStream::connect(actuator_listener.local_addr().unwrap()).unwrap();
    let (actuator_side, _) = actuator_listener.accept().unwrap();
    let mut commands = LineReader::new(actuator_side, READ_TIMEOUT).unwrap();

    let sensor_listener = local_listener();
    let sensor_addr = sensor_listener.local_addr().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let engine_running = Arc::clone(&running);
    let engine = thread::spawn(move || {
        let mut engine = DecisionEngine::new(actuator_stream, Classifier::new(400.0));
        engine.run(sensor_listener, &engine_running).unwrap()
    });

    let mut sensor = TcpStream::connect(sensor_addr).unwrap();
    send_line(&mut sensor, "abc,xyz\n45,200\n1,2,3\n300,399\n").unwrap();
    drop(sensor);

    // Sensor hang-up shuts the engine down the same way as Ctrl-C
    assert_eq!(engine.join().unwrap(), EngineExit::SensorClosed);
    assert_eq!(
        read_lines(&mut commands, 10),
        vec!["right", "left", "stop", "exit"]
    );
}

#[test]
fn actuator_runs_commands_until_exit() {
    let listener = local_listener();
    let addr = listener.local_addr().unwrap();

    let actuator = thread::spawn(move || {
        let running = AtomicBool::new(true);
        let mut actuator = simulated_actuator();
        let exit = actuator.serve(listener, &running).unwrap();

        let driver = actuator.driver();
        let sim = driver.motors().simulated().unwrap();
        let left: Vec<MotorEffort> = sim.left.history().copied().collect();
        let right: Vec<MotorEffort> = sim.right.history().copied().collect();
        (exit, driver.state(), driver.is_released(), left, right)
    });

    let mut client = TcpStream::connect(addr).unwrap();
    send_line(&mut client, "forward\nsomersault\nRIGHT\nstop\nstop\nexit\n").unwrap();

    let (exit, state, released, left, right) = actuator.join().unwrap();
    assert_eq!(exit, ActuatorExit::Commanded);
    assert_eq!(state, ActuatorState::Idle);
    assert!(released);

    // startup halt, forward, right turn, stop, stop, then shutdown halt + release
    assert_eq!(
        left,
        vec![
            MotorEffort::Halted,
            MotorEffort::Forward(0.5),
            MotorEffort::Forward(0.5),
            MotorEffort::Halted,
            MotorEffort::Halted,
            MotorEffort::Halted,
            MotorEffort::Released,
        ]
    );
    assert_eq!(right[2], MotorEffort::Backward(0.5 * 0.6));
}

#[test]
fn actuator_releases_motors_when_peer_disconnects() {
    let listener = local_listener();
    let addr = listener.local_addr().unwrap();

    let actuator = thread::spawn(move || {
        let running = AtomicBool::new(true);
        let mut actuator = simulated_actuator();
        let exit = actuator.serve(listener, &running).unwrap();
        (exit, actuator.driver().is_released())
    });

    let mut client = TcpStream::connect(addr).unwrap();
    send_line(&mut client, "forward\n").unwrap();
    drop(client);

    assert_eq!(actuator.join().unwrap(), (ActuatorExit::PeerClosed, true));
}

#[test]
fn replayed_scans_flow_through_to_the_motors() {
    let actuator_listener = local_listener();
    let actuator_addr = actuator_listener.local_addr().unwrap();
    let sensor_listener = local_listener();
    let sensor_addr = sensor_listener.local_addr().unwrap();

    let actuator = thread::spawn(move || {
        let running = AtomicBool::new(true);
        let mut actuator = simulated_actuator();
        let exit = actuator.serve(actuator_listener, &running).unwrap();
        let sim = actuator.driver().motors().simulated().unwrap();
        let left: Vec<MotorEffort> = sim.left.history().copied().collect();
        (exit, left)
    });

    let engine = thread::spawn(move || {
        let running = AtomicBool::new(true);
        let stream = TcpStream::connect(actuator_addr).unwrap();
        let mut engine = DecisionEngine::new(stream, Classifier::default());
        engine.run(sensor_listener, &running).unwrap()
    });

    let recording = "10,900\n60,150\n\n300,200\n";
    let source = ReplaySource::from_reader(Cursor::new(recording));
    let stream = TcpStream::connect(sensor_addr).unwrap();
    let mut streamer = SensorStreamer::new(source, stream, Duration::from_millis(1));

    let running = AtomicBool::new(true);
    assert_eq!(streamer.run(&running), StreamEnd::Exhausted);
    assert!(streamer.shutdown().is_clean());

    assert_eq!(engine.join().unwrap(), EngineExit::SensorClosed);
    let (exit, left) = actuator.join().unwrap();
    assert_eq!(exit, ActuatorExit::Commanded);

    // forward, right turn, left turn, then the engine's stop and exit
    assert_eq!(
        left,
        vec![
            MotorEffort::Halted,
            MotorEffort::Forward(0.5),
            MotorEffort::Forward(0.5),
            MotorEffort::Backward(0.5 * 0.6),
            MotorEffort::Halted,
            MotorEffort::Halted,
            MotorEffort::Released,
        ]
    );
}
