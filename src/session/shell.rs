use super::*;

/// Username prompts of IOS, VRP, Comware and most terminal servers.
static USERNAME_PROMPT: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"(?i)(?:user\s*name|login)\s*:\s*$") {
        Ok(re) => re,
        Err(err) => panic!("invalid USERNAME_PROMPT regex: {err}"),
    });

static PASSWORD_PROMPT: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"(?i)pass(?:word|code)\s*:\s*$") {
        Ok(re) => re,
        Err(err) => panic!("invalid PASSWORD_PROMPT regex: {err}"),
    });

/// Messages printed when a device rejects the credentials.
static LOGIN_REJECTED: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(
        r"(?i)(?:authentication fail|login incorrect|login invalid|bad password|access denied|username or password (?:is )?(?:wrong|invalid))",
    ) {
        Ok(re) => re,
        Err(err) => panic!("invalid LOGIN_REJECTED regex: {err}"),
    }
});

/// Command/response loop over a device shell.
///
/// Text from the transport arrives on `recv`; input goes out through
/// `sender`. The shell owns the prompt matcher, so it knows when a command
/// has finished and when the device waits for a keypress.
pub struct Shell {
    sender: Sender<String>,
    recv: Receiver<String>,
    matcher: PromptMatcher,
    prompt: String,
    newline: &'static str,
    device_addr: String,
}

impl Shell {
    pub fn new(
        device_addr: String,
        vendor: Vendor,
        sender: Sender<String>,
        recv: Receiver<String>,
        newline: &'static str,
    ) -> Result<Self, ConnectError> {
        Ok(Self {
            sender,
            recv,
            matcher: PromptMatcher::for_vendor(vendor)?,
            prompt: String::new(),
            newline,
            device_addr,
        })
    }

    pub fn device_addr(&self) -> &str {
        &self.device_addr
    }

    /// Last prompt seen, as received.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn matcher(&self) -> &PromptMatcher {
        &self.matcher
    }

    /// Sends `text` followed by the transport's line ending.
    pub async fn send_line(&self, text: &str) -> Result<(), ConnectError> {
        self.sender.send(format!("{text}{}", self.newline)).await?;
        Ok(())
    }

    /// Reads until the first CLI prompt after authentication.
    pub async fn wait_prompt(&mut self, timeout: Duration) -> Result<String, ConnectError> {
        let Shell {
            sender,
            recv,
            matcher,
            prompt,
            ..
        } = self;
        let mut buffer = String::new();
        let mut initial_output = String::new();

        let init_result = tokio::time::timeout(timeout, async {
            loop {
                let Some(data) = recv.recv().await else {
                    return Err(ConnectError::ChannelDisconnectError);
                };
                trace!("{:?}", data);
                buffer.push_str(&data);
                initial_output.push_str(&data);

                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer.drain(..=newline_pos).collect::<String>();
                    matcher.read(line.trim_end());
                }

                if !buffer.is_empty() {
                    if matcher.read_prompt(&buffer) {
                        matcher.read(&buffer);
                        *prompt = buffer.clone();
                        return Ok(());
                    }
                    if let Some(c) = matcher.read_need_write(&buffer) {
                        matcher.read(&buffer);
                        buffer.clear();
                        sender.send(c.to_string()).await?;
                    }
                }
            }
        })
        .await;

        match init_result {
            Ok(Ok(())) => Ok(self.prompt.clone()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ConnectError::ConnectTimeout(if initial_output.is_empty() {
                "waiting for initial prompt".to_string()
            } else {
                initial_output
            })),
        }
    }

    /// Answers username and password prompts until the CLI prompt shows up.
    ///
    /// A second password prompt, or a rejection message, fails with
    /// [`ConnectError::AuthenticationFailed`].
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<String, ConnectError> {
        let Shell {
            sender,
            recv,
            matcher,
            prompt,
            newline,
            device_addr,
        } = self;
        let mut pending = String::new();
        let mut transcript = String::new();
        let mut password_sent = false;

        let login_result = tokio::time::timeout(timeout, async {
            loop {
                let Some(data) = recv.recv().await else {
                    return Err(ConnectError::ChannelDisconnectError);
                };
                trace!("{:?}", data);
                pending.push_str(&data);
                transcript.push_str(&data);

                if LOGIN_REJECTED.is_match(&pending) {
                    return Err(ConnectError::AuthenticationFailed(device_addr.clone()));
                }

                let tail = pending.rsplit('\n').next().unwrap_or_default();
                if tail.is_empty() {
                    continue;
                }
                if matcher.read_prompt(tail) {
                    matcher.read(tail);
                    *prompt = tail.to_string();
                    return Ok(());
                }
                if PASSWORD_PROMPT.is_match(tail) {
                    if password_sent {
                        return Err(ConnectError::AuthenticationFailed(device_addr.clone()));
                    }
                    debug!("{} Sending password", device_addr);
                    sender.send(format!("{password}{newline}")).await?;
                    password_sent = true;
                    pending.clear();
                } else if USERNAME_PROMPT.is_match(tail) {
                    if password_sent {
                        return Err(ConnectError::AuthenticationFailed(device_addr.clone()));
                    }
                    debug!("{} Sending username", device_addr);
                    sender.send(format!("{username}{newline}")).await?;
                    pending.clear();
                } else if let Some(c) = matcher.read_need_write(tail) {
                    sender.send(c.to_string()).await?;
                    pending.clear();
                }
            }
        })
        .await;

        match login_result {
            Ok(Ok(())) => Ok(self.prompt.clone()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ConnectError::ConnectTimeout(if transcript.is_empty() {
                "waiting for login prompt".to_string()
            } else {
                transcript
            })),
        }
    }

    /// Turns off pagination for the rest of the session. A device that
    /// rejects the command still works, since `More` prompts are answered.
    pub async fn disable_paging(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        if command.is_empty() {
            return Ok(());
        }
        match self.write(command, None, timeout).await {
            Ok(output) if output.success => {
                debug!("{} Paging disabled", self.device_addr);
                Ok(())
            }
            Ok(_) => {
                debug!("{} Device rejected '{}'", self.device_addr, command);
                Ok(())
            }
            Err(ConnectError::ExecTimeout(partial)) => {
                warn!(
                    "{} No prompt after '{}': {:?}",
                    self.device_addr, command, partial
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Executes a command and waits for the full output.
    ///
    /// With `expect`, reading stops once the pattern matches anything received
    /// for this command. Otherwise it stops at the first prompt line.
    pub async fn write(
        &mut self,
        command: &str,
        expect: Option<&Regex>,
        timeout: Duration,
    ) -> Result<Output, ConnectError> {
        let Shell {
            sender,
            recv,
            matcher,
            prompt,
            newline,
            ..
        } = self;

        // 1. Clear any residual data in the receiver
        while recv.try_recv().is_ok() {}
        matcher.reset();

        // 2. Send command to remote shell
        sender.send(format!("{command}{newline}")).await?;

        // 3. Receive data
        let mut clean_output = String::new();
        let mut line_buffer = String::new();
        let mut line = String::new();

        let result = tokio::time::timeout(timeout, async {
            loop {
                let Some(data) = recv.recv().await else {
                    return Err(ConnectError::ChannelDisconnectError);
                };
                line_buffer.push_str(&data);

                while let Some(newline_pos) = line_buffer.find('\n') {
                    line.clear();
                    line.extend(line_buffer.drain(..=newline_pos));
                    let trim_start = IGNORE_START_LINE.replace(&line, "");
                    matcher.read(trim_start.trim_end());
                    clean_output.push_str(&trim_start);
                }

                if let Some(pattern) = expect {
                    let tail_matches = !line_buffer.is_empty() && pattern.is_match(&line_buffer);
                    if tail_matches || pattern.is_match(&clean_output) {
                        if !line_buffer.is_empty() {
                            matcher.read(&line_buffer);
                            clean_output.push_str(&line_buffer);
                            *prompt = std::mem::take(&mut line_buffer);
                        }
                        return Ok(!matcher.error());
                    }
                }

                // The trailing partial line is usually the prompt
                if !line_buffer.is_empty() {
                    if expect.is_none() && matcher.read_prompt(&line_buffer) {
                        matcher.read(&line_buffer);
                        clean_output.push_str(&line_buffer);
                        *prompt = std::mem::take(&mut line_buffer);
                        return Ok(!matcher.error());
                    }
                    if let Some(c) = matcher.read_need_write(&line_buffer) {
                        matcher.read(&line_buffer);
                        line_buffer.clear();
                        trace!("Input required: '{:?}'", c);
                        sender.send(c.to_string()).await?;
                    }
                }
            }
        })
        .await;

        let success = match result {
            Err(_) => {
                clean_output.push_str(&line_buffer);
                return Err(ConnectError::ExecTimeout(clean_output));
            }
            Ok(Err(err)) => return Err(err),
            Ok(Ok(success)) => success,
        };

        let all = clean_output;
        let mut content = all.as_str();

        // Remove the echoed command from the beginning of the output
        if !command.is_empty() && content.starts_with(command) {
            content = content
                .strip_prefix(command)
                .unwrap_or(content)
                .trim_start_matches(['\n', '\r']);
        }

        // Remove the trailing prompt
        let content = match content.rfind('\n') {
            Some(pos) => content[..pos].trim_end_matches('\r'),
            None => "",
        };

        Ok(Output {
            success,
            content: content.to_string(),
            all: all.clone(),
            prompt: self.matcher.current_prompt().map(|v| v.to_string()),
        })
    }

    /// Stops reading and sends the logout command if the link is still up.
    pub async fn logout(&mut self, command: &str, connected: bool) {
        self.recv.close();
        if connected && !command.is_empty() {
            if let Err(e) = self.send_line(command).await {
                debug!("{} Failed to send logout command: {:?}", self.device_addr, e);
            }
            // Give the device time to process the logout before the link drops
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
