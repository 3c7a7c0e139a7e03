use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};

use crate::Error;

/// Socket of a connection, plain or TLS wrapped.
pub(crate) enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    /// Open a socket to `host:port`, completing the TLS handshake if there is a config.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
        tls: Option<Arc<ClientConfig>>,
    ) -> Result<Stream, Error> {
        let tcp = connect_tcp(host, port, connect_timeout)?;
        tcp.set_read_timeout(read_timeout)?;
        tcp.set_nodelay(true)?;

        let Some(config) = tls else {
            return Ok(Stream::Plain(tcp));
        };

        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| Error::Tls(e.to_string()))?;
        let conn =
            ClientConnection::new(config, server_name).map_err(|e| Error::Tls(e.to_string()))?;

        let mut stream = StreamOwned::new(conn, tcp);
        while stream.conn.is_handshaking() {
            stream.conn.complete_io(&mut stream.sock)?;
        }
        debug!("TLS handshake complete: {}", host);

        Ok(Stream::Tls(Box::new(stream)))
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.tcp().set_read_timeout(timeout)
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(v) => v,
            Stream::Tls(v) => &v.sock,
        }
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream, Error> {
    let mut last_err = None;

    for addr in (host, port).to_socket_addrs()? {
        let result = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        };

        match result {
            Ok(v) => {
                debug!("Connected to {}", addr);
                return Ok(v);
            }
            Err(e) => {
                debug!("Failed to connect to {}: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    let err = last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", host))
    });

    Err(err.into())
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(v) => v.read(buf),
            Stream::Tls(v) => v.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(v) => v.write(buf),
            Stream::Tls(v) => v.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(v) => v.flush(),
            Stream::Tls(v) => v.flush(),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Plain(_) => write!(f, "Stream::Plain"),
            Stream::Tls(_) => write!(f, "Stream::Tls"),
        }
    }
}
