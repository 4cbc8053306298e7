use clap::Parser;
use netmidirec::{
    logging,
    serializer::SmfSerializerFactory,
    transport::UdpReceiver,
    Args, Dispatcher, InlineHost, RecorderConfig, SessionHost, WorkerPool,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    let args = parse_command_line_arguments();
    initialize_logging(args.verbose);

    let config = match RecorderConfig::load(&args) {
        Ok(config) => config,
        Err(e) => fail(format!("Invalid configuration: {}", e)),
    };

    let receiver = match UdpReceiver::bind(&config.bind) {
        Ok(receiver) => receiver,
        Err(e) => fail(format!(
            "Cannot listen on {}: {}",
            config.bind.socket_addr(),
            e
        )),
    };

    let shutdown = install_signal_handler();

    let factory = match SmfSerializerFactory::for_session(&config.session) {
        Ok(factory) => factory,
        Err(e) => fail(format!("Invalid configuration: {}", e)),
    };
    if config.inline_sessions {
        let host = InlineHost::new(config.session.clone(), factory);
        run(&receiver, host, config.split_by_sender, &shutdown);
    } else {
        let host = WorkerPool::new(config.session.clone(), factory);
        run(&receiver, host, config.split_by_sender, &shutdown);
    }

    log::info!("Terminated");
}

fn parse_command_line_arguments() -> Args {
    Args::parse()
}

fn initialize_logging(verbose: bool) {
    if let Err(e) = logging::init_logger(verbose) {
        eprintln!("{}", e);
    }
    log::info!("{} {} starting", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}

fn install_signal_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Terminating program...");
        flag.store(true, Ordering::SeqCst);
    }) {
        fail(format!("Cannot install signal handler: {}", e));
    }
    shutdown
}

fn run<H: SessionHost>(
    receiver: &UdpReceiver,
    host: H,
    split_by_sender: bool,
    shutdown: &AtomicBool,
) {
    let mut dispatcher = Dispatcher::new(host, split_by_sender);
    receiver.run(&mut dispatcher, shutdown);
}

fn fail(error_msg: String) -> ! {
    log::error!("{}", error_msg);
    eprintln!("{}", error_msg);
    std::process::exit(1);
}
