use anyhow::{bail, Result};
use argh::FromArgs;
use env_logger::{Builder, Env};
use peri_ecr::frame_io::FrameIo;
use peri_ecr::sequences::Sequence;
use peri_ecr::{constants, packets, sequences};
use peri_transport::network::{NetworkConfig, NetworkTransport};
use peri_transport::Transport;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_stream::StreamExt;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommands {
    Status(StatusArgs),
    Registration(RegistrationArgs),
    SetTerminalId(SetTerminalIdArgs),
    Initialization(InitializationArgs),
    PrintSystemConfiguration(PrintSystemConfigurationArgs),
    EndOfDay(EndOfDayArgs),
    ReadCard(ReadCardArgs),
    Authorization(AuthorizationArgs),
    Reversal(ReversalArgs),
    Refund(RefundArgs),
}

#[derive(FromArgs, PartialEq, Debug)]
/// Query the PT's status.
#[argh(subcommand, name = "status")]
struct StatusArgs {
    /// service byte to send. See chapter 2.55.1 for details.
    #[argh(option)]
    service_byte: Option<u8>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Run registration.
#[argh(subcommand, name = "registration")]
struct RegistrationArgs {
    /// currency code, defaults to 978 (EUR).
    #[argh(option, default = "978")]
    currency_code: usize,

    /// config byte, defaults to 0xde.
    #[argh(option, default = "0xde")]
    config_byte: u8,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Set the terminal id.
#[argh(subcommand, name = "set_terminal_id")]
struct SetTerminalIdArgs {
    /// terminal id to set.
    #[argh(option)]
    terminal_id: usize,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Force the PT to resend its initialization sequence.
#[argh(subcommand, name = "init")]
struct InitializationArgs {}

#[derive(FromArgs, PartialEq, Debug)]
/// Print the PT's system configuration.
#[argh(subcommand, name = "print_system_configuration")]
struct PrintSystemConfigurationArgs {}

#[derive(FromArgs, PartialEq, Debug)]
/// Run end-of-day settlement.
#[argh(subcommand, name = "end_of_day")]
struct EndOfDayArgs {}

#[derive(FromArgs, PartialEq, Debug)]
/// Wait for a card and print what was read.
#[argh(subcommand, name = "read_card")]
struct ReadCardArgs {
    /// timeout in seconds to wait for a card.
    #[argh(option, default = "15")]
    timeout: u8,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Run a sale authorization.
#[argh(subcommand, name = "authorization")]
struct AuthorizationArgs {
    /// amount in the minor currency unit (e.g. cents).
    #[argh(option)]
    amount: usize,

    /// currency code, defaults to 978 (EUR).
    #[argh(option, default = "978")]
    currency_code: usize,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Reverse (void) a completed sale.
#[argh(subcommand, name = "reversal")]
struct ReversalArgs {
    /// receipt number of the sale to void.
    #[argh(option)]
    receipt: usize,

    /// amount in the minor currency unit.
    #[argh(option)]
    amount: usize,

    /// currency code, defaults to 978 (EUR).
    #[argh(option, default = "978")]
    currency_code: usize,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Refund against a completed sale.
#[argh(subcommand, name = "refund")]
struct RefundArgs {
    /// receipt number of the sale to refund.
    #[argh(option)]
    receipt: usize,

    /// amount in the minor currency unit.
    #[argh(option)]
    amount: usize,

    /// currency code, defaults to 978 (EUR).
    #[argh(option, default = "978")]
    currency_code: usize,
}

#[derive(FromArgs, Debug)]
/// Interact with a ZVT payment terminal directly over TCP.
struct Args {
    /// address of the payment terminal, e.g. 127.0.0.1:20007.
    #[argh(option, default = "\"127.0.0.1:20007\".to_string()")]
    addr: String,

    /// password of the payment terminal.
    #[argh(option, default = "123456")]
    password: usize,

    #[argh(subcommand)]
    command: SubCommands,
}

fn init_logger() {
    let env = Env::default().filter_or("PERI_LOG", "info");
    Builder::from_env(env)
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
}

async fn status(src: &mut FrameIo<'_>, password: usize, service_byte: Option<u8>) -> Result<()> {
    let request = packets::StatusEnquiry {
        password: Some(password),
        service_byte,
    };
    let mut stream = sequences::StatusEnquiry::into_stream(&request, src);
    while let Some(response) = stream.next().await {
        log::info!("{:#?}", response?);
    }
    Ok(())
}

async fn registration(src: &mut FrameIo<'_>, password: usize, args: &RegistrationArgs) -> Result<()> {
    let request = packets::Registration {
        password,
        config_byte: args.config_byte,
        currency: Some(args.currency_code),
    };
    let mut stream = sequences::Registration::into_stream(&request, src);
    while let Some(response) = stream.next().await {
        use sequences::RegistrationResponse::*;
        match response? {
            CompletionData(data) => log::info!("{data:#?}"),
        }
    }
    Ok(())
}

async fn set_terminal_id(src: &mut FrameIo<'_>, password: usize, args: &SetTerminalIdArgs) -> Result<()> {
    let request = packets::SetTerminalId {
        password,
        terminal_id: Some(args.terminal_id),
    };
    let mut stream = sequences::SetTerminalId::into_stream(&request, src);
    while let Some(response) = stream.next().await {
        use sequences::SetTerminalIdResponse::*;
        match response? {
            CompletionData(data) => log::info!("{data:#?}"),
            Abort(data) => bail!("set_terminal_id aborted: {data:?}"),
        }
    }
    Ok(())
}

async fn initialization(src: &mut FrameIo<'_>, password: usize) -> Result<()> {
    let request = packets::Initialization { password };
    let mut stream = sequences::Initialization::into_stream(&request, src);
    while let Some(response) = stream.next().await {
        use sequences::InitializationResponse::*;
        match response? {
            IntermediateStatusInformation(data) => log::info!("{data:#?}"),
            PrintLine(data) => log::info!("{}", data.text),
            PrintTextBlock(_) => (),
            CompletionData(data) => log::info!("{data:#?}"),
            Abort(data) => bail!("initialization aborted: {data:?}"),
        }
    }
    Ok(())
}

async fn print_system_configuration(src: &mut FrameIo<'_>) -> Result<()> {
    let request = packets::PrintSystemConfiguration {};
    let mut stream = sequences::PrintSystemConfiguration::into_stream(&request, src);
    while let Some(response) = stream.next().await {
        use sequences::PrintSystemConfigurationResponse::*;
        match response? {
            PrintLine(data) => log::info!("{}", data.text),
            PrintTextBlock(_) => (),
            CompletionData(_) => (),
        }
    }
    Ok(())
}

async fn end_of_day(src: &mut FrameIo<'_>, password: usize) -> Result<()> {
    let request = packets::EndOfDay { password };
    let mut stream = sequences::EndOfDay::into_stream(&request, src);
    while let Some(response) = stream.next().await {
        use sequences::EndOfDayResponse::*;
        match response? {
            StatusInformation(data) => log::info!("{data:#?}"),
            PrintLine(data) => log::info!("{}", data.text),
            PrintTextBlock(_) | IntermediateStatusInformation(_) => (),
            CompletionData(data) => log::info!("{data:#?}"),
            Abort(data) => bail!("end_of_day aborted: {data:?}"),
        }
    }
    Ok(())
}

async fn read_card(src: &mut FrameIo<'_>, args: &ReadCardArgs) -> Result<()> {
    let request = packets::ReadCard {
        timeout_sec: args.timeout,
        service_byte: None,
        dialog_control: None,
    };
    let mut stream = sequences::ReadCard::into_stream(&request, src);
    while let Some(response) = stream.next().await {
        use sequences::ReadCardResponse::*;
        match response? {
            IntermediateStatusInformation(_) => (),
            Abort(data) => {
                if data.error == constants::ErrorMessages::AbortViaTimeoutOrAbortKey as u8 {
                    log::info!("no card presented before timeout");
                } else {
                    bail!("read_card aborted: {data:?}");
                }
            }
            StatusInformation(data) => log::info!("{data:#?}"),
        }
    }
    Ok(())
}

async fn authorization(src: &mut FrameIo<'_>, args: &AuthorizationArgs) -> Result<()> {
    let request = packets::Authorization {
        amount: Some(args.amount),
        currency: Some(args.currency_code),
        ..packets::Authorization::default()
    };
    let mut stream = sequences::Authorization::into_stream(&request, src);
    use sequences::AuthorizationResponse::*;
    while let Some(response) = stream.next().await {
        match response? {
            IntermediateStatusInformation(_) | StatusInformation(_) => (),
            PrintLine(data) => log::info!("{}", data.text),
            PrintTextBlock(_) => (),
            CompletionData(data) => log::info!("{data:#?}"),
            Abort(data) => bail!("authorization aborted: {data:?}"),
        }
    }
    Ok(())
}

async fn reversal(src: &mut FrameIo<'_>, args: &ReversalArgs) -> Result<()> {
    let request = packets::Reversal {
        receipt_no: Some(args.receipt),
        amount: Some(args.amount),
        currency: Some(args.currency_code),
    };
    let mut stream = sequences::Reversal::into_stream(&request, src);
    use sequences::AuthorizationResponse::*;
    while let Some(response) = stream.next().await {
        match response? {
            IntermediateStatusInformation(_) | StatusInformation(_) => (),
            PrintLine(data) => log::info!("{}", data.text),
            PrintTextBlock(_) => (),
            CompletionData(data) => log::info!("{data:#?}"),
            Abort(data) => bail!("reversal aborted: {data:?}"),
        }
    }
    Ok(())
}

async fn refund(src: &mut FrameIo<'_>, args: &RefundArgs) -> Result<()> {
    let request = packets::Refund {
        amount: Some(args.amount),
        currency: Some(args.currency_code),
        receipt_no: Some(args.receipt),
    };
    let mut stream = sequences::Refund::into_stream(&request, src);
    use sequences::AuthorizationResponse::*;
    while let Some(response) = stream.next().await {
        match response? {
            IntermediateStatusInformation(_) | StatusInformation(_) => (),
            PrintLine(data) => log::info!("{}", data.text),
            PrintTextBlock(_) => (),
            CompletionData(data) => log::info!("{data:#?}"),
            Abort(data) => bail!("refund aborted: {data:?}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let args: Args = argh::from_env();

    let addr: SocketAddr = args.addr.parse()?;
    let mut transport = NetworkTransport::new(NetworkConfig {
        addr,
        keepalive: None,
    });
    transport.connect().await?;
    let mut src = FrameIo::new(&mut transport, Duration::from_secs(30));

    match args.command {
        SubCommands::Status(a) => status(&mut src, args.password, a.service_byte).await?,
        SubCommands::Registration(a) => registration(&mut src, args.password, &a).await?,
        SubCommands::SetTerminalId(a) => set_terminal_id(&mut src, args.password, &a).await?,
        SubCommands::Initialization(_) => initialization(&mut src, args.password).await?,
        SubCommands::PrintSystemConfiguration(_) => print_system_configuration(&mut src).await?,
        SubCommands::EndOfDay(_) => end_of_day(&mut src, args.password).await?,
        SubCommands::ReadCard(a) => read_card(&mut src, &a).await?,
        SubCommands::Authorization(a) => authorization(&mut src, &a).await?,
        SubCommands::Reversal(a) => reversal(&mut src, &a).await?,
        SubCommands::Refund(a) => refund(&mut src, &a).await?,
    }

    transport.disconnect().await;
    Ok(())
}
