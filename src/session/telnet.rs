use super::*;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Strips Telnet commands from a byte stream and produces the replies a
/// minimal client owes the server.
///
/// The client refuses every option it is asked to perform and accepts only
/// server-side echo and suppress-go-ahead, which leaves the link in
/// character-at-a-time mode with remote echo.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: DecodeState,
}

impl TelnetDecoder {
    /// Returns `(text, replies)` for one chunk. State carries across chunks, so
    /// a command split between reads is still recognized.
    pub fn feed(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut text = Vec::with_capacity(input.len());
        let mut replies = Vec::new();

        for &byte in input {
            self.state = match (self.state, byte) {
                (DecodeState::Data, IAC) => DecodeState::Iac,
                // CR NUL
                (DecodeState::Data, 0) => DecodeState::Data,
                (DecodeState::Data, b) => {
                    text.push(b);
                    DecodeState::Data
                }
                (DecodeState::Iac, IAC) => {
                    text.push(IAC);
                    DecodeState::Data
                }
                (DecodeState::Iac, DO | DONT | WILL | WONT) => DecodeState::Negotiate(byte),
                (DecodeState::Iac, SB) => DecodeState::Subnegotiation,
                (DecodeState::Iac, _) => DecodeState::Data,
                (DecodeState::Negotiate(verb), option) => {
                    if let Some(answer) = negotiation_reply(verb, option) {
                        replies.extend_from_slice(&[IAC, answer, option]);
                    }
                    DecodeState::Data
                }
                (DecodeState::Subnegotiation, IAC) => DecodeState::SubnegotiationIac,
                (DecodeState::Subnegotiation, _) => DecodeState::Subnegotiation,
                (DecodeState::SubnegotiationIac, SE) => DecodeState::Data,
                (DecodeState::SubnegotiationIac, _) => DecodeState::Subnegotiation,
            };
        }

        (text, replies)
    }
}

fn negotiation_reply(verb: u8, option: u8) -> Option<u8> {
    match verb {
        DO => Some(WONT),
        WILL if option == OPT_ECHO || option == OPT_SUPPRESS_GO_AHEAD => Some(DO),
        WILL => Some(DONT),
        _ => None,
    }
}

/// Doubles IAC bytes in outgoing data.
fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len());
    for &byte in data {
        escaped.push(byte);
        if byte == IAC {
            escaped.push(IAC);
        }
    }
    escaped
}

/// Takes the longest valid UTF-8 prefix from `pending`, keeping an incomplete
/// trailing sequence for the next read. Invalid bytes are replaced.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let valid = err.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

/// Interactive CLI over Telnet, or over a console line exposed by a terminal
/// server.
pub struct TelnetSession {
    shell: Shell,
    io_task: JoinHandle<()>,
    logout: &'static str,
}

impl TelnetSession {
    /// Connects, answers the login dialogue and disables paging.
    pub async fn connect(params: &SessionParams) -> Result<Self, ConnectError> {
        let device_addr = params.device_addr.clone();

        let stream = TcpStream::connect((params.host.as_str(), params.port)).await?;
        stream.set_nodelay(true)?;
        debug!("{} TCP connection successful", device_addr);

        let (sender_to_shell, receiver_from_user) = mpsc::channel::<String>(256);
        let (sender_to_user, receiver_from_shell) = mpsc::channel::<String>(256);
        let io_task = tokio::spawn(run_io(
            stream,
            receiver_from_user,
            sender_to_user,
            device_addr.clone(),
        ));

        let mut shell = Shell::new(
            device_addr,
            params.vendor,
            sender_to_shell,
            receiver_from_shell,
            "\r\n",
        )?;

        let login = async {
            if params.login_method == LoginMethod::Console {
                // A console line is silent until it sees a keypress
                shell.send_line("").await?;
            }
            shell
                .login(&params.username, &params.password, params.login_timeout)
                .await?;
            shell
                .disable_paging(params.vendor.prompts().disable_paging, params.login_timeout)
                .await
        };

        if let Err(err) = login.await {
            io_task.abort();
            return Err(err);
        }

        Ok(Self {
            shell,
            io_task,
            logout: params.vendor.prompts().logout,
        })
    }
}

async fn run_io(
    stream: TcpStream,
    mut receiver_from_user: Receiver<String>,
    sender_to_user: Sender<String>,
    device_addr: String,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = TelnetDecoder::default();
    let mut pending = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            Some(data) = receiver_from_user.recv() => {
                if let Err(e) = writer.write_all(&escape_iac(data.as_bytes())).await {
                    debug!("{} Failed to send data to device: {:?}", device_addr, e);
                    break;
                }
            },
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => {
                        debug!("{} Telnet peer closed the connection.", device_addr);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        debug!("{} Telnet read failed: {:?}", device_addr, e);
                        break;
                    }
                };
                let (text, replies) = decoder.feed(&buf[..n]);
                if !replies.is_empty() && writer.write_all(&replies).await.is_err() {
                    break;
                }
                pending.extend_from_slice(&text);
                let text = take_utf8(&mut pending);
                if !text.is_empty() && sender_to_user.send(text).await.is_err() {
                    debug!("{} Shell output receiver dropped. Closing task.", device_addr);
                    break;
                }
            }
        }
    }
    debug!("{} Telnet I/O task ended.", device_addr);
}

#[async_trait]
impl TerminalSession for TelnetSession {
    fn device_addr(&self) -> &str {
        self.shell.device_addr()
    }

    fn is_connected(&self) -> bool {
        !self.io_task.is_finished()
    }

    async fn send_command(
        &mut self,
        command: &str,
        expect: Option<&Regex>,
        timeout: Duration,
    ) -> Result<Output, ConnectError> {
        if !self.is_connected() {
            return Err(ConnectError::ConnectClosedError);
        }
        self.shell.write(command, expect, timeout).await
    }

    async fn close(&mut self) -> Result<(), ConnectError> {
        debug!("{} Closing Telnet session", self.shell.device_addr());
        let connected = self.is_connected();
        self.shell.logout(self.logout, connected).await;
        self.io_task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn negotiation_is_stripped_and_answered() {
        let mut decoder = TelnetDecoder::default();
        let input = [
            IAC, DO, 24, // terminal type
            IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SUPPRESS_GO_AHEAD, IAC, WILL, 5,
            b'U', b's', b'e', b'r', b':',
        ];

        let (text, replies) = decoder.feed(&input);

        assert_eq!(text, b"User:");
        assert_eq!(
            replies,
            vec![
                IAC, WONT, 24, IAC, DO, OPT_ECHO, IAC, DO, OPT_SUPPRESS_GO_AHEAD, IAC, DONT, 5
            ]
        );
    }

    #[test]
    fn command_split_across_reads_is_recognized() {
        let mut decoder = TelnetDecoder::default();
        let (text, replies) = decoder.feed(&[b'a', IAC]);
        assert_eq!(text, b"a");
        assert!(replies.is_empty());

        let (text, replies) = decoder.feed(&[DO, 31, b'b']);
        assert_eq!(text, b"b");
        assert_eq!(replies, vec![IAC, WONT, 31]);
    }

    #[test]
    fn subnegotiation_and_nul_are_dropped() {
        let mut decoder = TelnetDecoder::default();
        let (text, _) = decoder.feed(&[IAC, SB, 24, 1, IAC, SE, b'x', b'\r', 0, b'\n']);
        assert_eq!(text, b"x\r\n");
    }

    #[test]
    fn escaped_iac_is_data() {
        let mut decoder = TelnetDecoder::default();
        let (text, _) = decoder.feed(&[IAC, IAC]);
        assert_eq!(text, vec![IAC]);
        assert_eq!(escape_iac(&[1, IAC, 2]), vec![1, IAC, IAC, 2]);
    }

    #[test]
    fn incomplete_utf8_is_kept_for_next_read() {
        let bytes = "华为".as_bytes();
        let mut pending = bytes[..4].to_vec();
        assert_eq!(take_utf8(&mut pending), "华");
        assert_eq!(pending, bytes[3..4].to_vec());
        pending.extend_from_slice(&bytes[4..]);
        assert_eq!(take_utf8(&mut pending), "为");
        assert!(pending.is_empty());
    }

    fn params(port: u16, method: LoginMethod) -> SessionParams {
        SessionParams {
            device_addr: format!("admin@127.0.0.1:{port}"),
            host: "127.0.0.1".to_string(),
            port,
            username: "admin".to_string(),
            password: "secret".to_string(),
            vendor: Vendor::Huawei,
            login_method: method,
            session_type: Vendor::Huawei.session_type(method),
            security: ConnectionSecurityOptions::default(),
            login_timeout: Duration::from_secs(5),
        }
    }

    async fn read_until(socket: &mut TcpStream, needle: &str) -> String {
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        while !String::from_utf8_lossy(&seen).contains(needle) {
            let n = socket.read(&mut buf).await.expect("read");
            assert!(n > 0, "client closed before sending {needle:?}");
            seen.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&seen).into_owned()
    }

    #[tokio::test]
    async fn telnet_login_and_command_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket
                .write_all(&[IAC, WILL, OPT_ECHO])
                .await
                .expect("write");
            socket.write_all(b"Username:").await.expect("write");
            read_until(&mut socket, "admin\r\n").await;
            socket.write_all(b"\r\nPassword:").await.expect("write");
            read_until(&mut socket, "secret\r\n").await;
            socket.write_all(b"\r\n<core-1>").await.expect("write");
            read_until(&mut socket, "screen-length 0 temporary\r\n").await;
            socket
                .write_all(b"screen-length 0 temporary\r\nInfo: The configuration takes effect on the current user terminal interface only.\r\n<core-1>")
                .await
                .expect("write");
            read_until(&mut socket, "display clock\r\n").await;
            socket
                .write_all(b"display clock\r\n2024-05-01 10:00:00\r\n<core-1>")
                .await
                .expect("write");
            read_until(&mut socket, "quit\r\n").await;
        });

        let mut session = TelnetSession::connect(&params(port, LoginMethod::Telnet))
            .await
            .expect("connect");
        assert!(session.is_connected());

        let output = session
            .send_command("display clock", None, Duration::from_secs(5))
            .await
            .expect("command");
        assert_eq!(output.content, "2024-05-01 10:00:00");

        session.close().await.expect("close");
        server.await.expect("server");
    }

    #[tokio::test]
    async fn console_line_is_woken_with_newline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            read_until(&mut socket, "\r\n").await;
            socket.write_all(b"\r\n<core-1>").await.expect("write");
            read_until(&mut socket, "screen-length 0 temporary\r\n").await;
            socket.write_all(b"\r\n<core-1>").await.expect("write");
        });

        let mut session = TelnetSession::connect(&params(port, LoginMethod::Console))
            .await
            .expect("connect");
        server.await.expect("server");
        session.close().await.expect("close");
    }
}
