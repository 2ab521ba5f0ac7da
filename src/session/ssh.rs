use super::*;

/// Interactive shell over an SSH channel with a PTY.
pub struct SshSession {
    client: Client,
    shell: Shell,
    logout: &'static str,
}

impl SshSession {
    /// Authenticates with a password, opens a PTY shell, waits for the first
    /// prompt and disables paging.
    pub async fn connect(params: &SessionParams) -> Result<Self, ConnectError> {
        let device_addr = params.device_addr.clone();

        let config = Config {
            preferred: params.security.preferred(),
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let client = Client::connect_with_config(
            (params.host.clone(), params.port),
            &params.username,
            AuthMethod::with_password(&params.password),
            params.security.server_check.clone(),
            config,
        )
        .await
        .map_err(|err| match err {
            async_ssh2_tokio::Error::PasswordWrong => {
                ConnectError::AuthenticationFailed(device_addr.clone())
            }
            other => ConnectError::from(other),
        })?;
        debug!("{} TCP connection successful", device_addr);

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{} Shell request successful", device_addr);

        let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<String>(256);
        let (sender_to_user, receiver_from_shell) = mpsc::channel::<String>(256);

        let io_task_device_addr = device_addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = receiver_from_user.recv() => {
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{} Failed to send data to shell: {:?}", io_task_device_addr, e);
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                let text = String::from_utf8_lossy(data).into_owned();
                                if sender_to_user.send(text).await.is_err() {
                                    debug!("{} Shell output receiver dropped. Closing task.", io_task_device_addr);
                                    break;
                                }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{} Shell exited with status code: {}", io_task_device_addr, exit_status);
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{} Shell sent EOF.", io_task_device_addr);
                                break;
                            }
                            _ => {}
                        }
                    },
                    else => break,
                }
            }
            debug!("{} SSH I/O task ended.", io_task_device_addr);
        });

        let mut shell = Shell::new(
            device_addr,
            params.vendor,
            sender_to_shell,
            receiver_from_shell,
            "\n",
        )?;
        shell.wait_prompt(params.login_timeout).await?;
        shell
            .disable_paging(params.vendor.prompts().disable_paging, params.login_timeout)
            .await?;

        Ok(Self {
            client,
            shell,
            logout: params.vendor.prompts().logout,
        })
    }
}

#[async_trait]
impl TerminalSession for SshSession {
    fn device_addr(&self) -> &str {
        self.shell.device_addr()
    }

    fn is_connected(&self) -> bool {
        !self.client.is_closed()
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
        debug!("{} Closing SSH session", self.shell.device_addr());
        let connected = self.is_connected();
        self.shell.logout(self.logout, connected).await;
        // The client disconnects when dropped.
        Ok(())
    }
}
