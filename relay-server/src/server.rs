//! 中继服务器
//!
//! 每个连接一个 I/O 任务：读到的数据转成事件交给 [`Hub`]，
//! 再把 hub 放进发送队列的消息写回连接。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_protocol::{
    Connection, ProtocolError, TcpListener, TcpTransport, Transport, TransportListener,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::hub::{Event, Hub};
use crate::relay::PackRelay;
use crate::resource::ResourceTable;
use crate::session::{Outbound, SessionHandle, SessionId};

/// 事件队列容量
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// 关闭时等待连接任务退出的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pack 中继服务器
pub struct RelayServer {
    config: ServerConfig,
    /// 当前连接数（含未握手的连接）
    connection_count: Arc<AtomicUsize>,
    /// 下一个会话 ID
    next_session_id: AtomicU64,
    /// 关闭信号发送端
    shutdown_tx: watch::Sender<bool>,
    /// 关闭信号接收端（交给 hub）
    shutdown_rx: watch::Receiver<bool>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            connection_count: Arc::new(AtomicUsize::new(0)),
            next_session_id: AtomicU64::new(1),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// 当前连接数
    pub fn online_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// 增加连接数，超过限制时返回 false
    fn try_add_connection(&self) -> bool {
        self.connection_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < self.config.max_connections).then_some(current + 1)
            })
            .is_ok()
    }

    fn resources(&self) -> ResourceTable {
        let mut resources = ResourceTable::new();
        resources.register(self.config.resource_path.clone(), Arc::new(PackRelay));
        resources
    }

    /// 绑定配置中的地址并运行（支持 graceful shutdown）
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.addr)
            .await?
            .with_config(self.config.transport.clone());
        info!(
            "Relay server listening on {} (resource {})",
            listener.local_addr()?,
            self.config.resource_path
        );
        self.serve(listener).await
    }

    /// 在已绑定的监听器上运行
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let hub = Hub::new(self.resources());
        let hub_task = tokio::spawn(hub.run(
            events_rx,
            self.config.key_push_interval,
            self.shutdown_rx.clone(),
        ));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(transport) => self.accept(transport, &events_tx).await,
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal, initiating graceful shutdown...");
                    break;
                }
            }
        }

        self.shutdown(hub_task).await;
        Ok(())
    }

    async fn accept(&self, transport: TcpTransport, events_tx: &mpsc::Sender<Event>) {
        let peer = transport.peer_addr();
        if !self.try_add_connection() {
            warn!("Connection limit reached, rejecting {:?}", peer);
            return;
        }

        let id: SessionId = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        // 先登记会话，再启动 I/O 任务，保证 hub 看到的事件顺序正确
        let accepted = Event::Accepted {
            handle: SessionHandle::new(id, outbound_tx),
        };
        if events_tx.send(accepted).await.is_err() {
            self.connection_count.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        debug!("Session {} connected from {:?}", id, peer);

        let conn = Connection::new(transport);
        let events_tx = events_tx.clone();
        let idle_timeout = self.config.idle_timeout;
        let connection_count = Arc::clone(&self.connection_count);
        tokio::spawn(async move {
            drive_connection(id, conn, outbound_rx, events_tx, idle_timeout).await;
            connection_count.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// 执行 graceful shutdown
    async fn shutdown(&self, hub_task: JoinHandle<()>) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = hub_task.await {
            error!("Hub task failed: {}", e);
        }

        // 等待连接任务退出
        let start = Instant::now();
        while self.online_count() > 0 {
            if start.elapsed() > SHUTDOWN_GRACE {
                warn!(
                    "Shutdown timeout, {} connections still open",
                    self.online_count()
                );
                break;
            }
            time::sleep(Duration::from_millis(100)).await;
        }

        info!("Relay server shutdown complete");
    }
}

/// 单个连接的 I/O 循环
///
/// 空闲计时只在收到数据时重置。
async fn drive_connection<R, W>(
    id: SessionId,
    conn: Connection<R, W>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<Event>,
    idle_timeout: Duration,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = conn.split();
    let idle = time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            result = reader.read_chunk() => {
                let event = match result {
                    Ok(text) => {
                        idle.as_mut().reset(Instant::now() + idle_timeout);
                        Event::Received { id, text }
                    }
                    Err(ProtocolError::ConnectionClosed) => Event::End { id },
                    Err(e) => Event::Failed { id, reason: e.to_string() },
                };
                let finished = !matches!(event, Event::Received { .. });
                if events.send(event).await.is_err() || finished {
                    break;
                }
            }

            command = outbound.recv() => {
                let result = match command {
                    Some(Outbound::Handshake(response)) => writer.write_raw(&response).await,
                    Some(Outbound::Message(body)) => writer.write_frame(&body).await,
                    Some(Outbound::Close) | None => break,
                };
                if let Err(e) = result {
                    let _ = events.send(Event::Failed { id, reason: e.to_string() }).await;
                    break;
                }
            }

            _ = &mut idle => {
                let _ = events.send(Event::IdleTimeout { id }).await;
                break;
            }
        }
    }

    // 关闭失败只记录，不影响会话已关闭的事实
    if let Err(e) = writer.shutdown().await {
        debug!("Session {} close error ignored: {}", id, e);
    }
}
