use mcp_modbus::{CallTarget, ModbusDefaults, OperationDispatcher, TracingSink};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let defaults = ModbusDefaults::default();
    println!("🔧 Modbus dispatcher example ({}:{})\n", defaults.host, defaults.port);

    // 注意：需要实际的 Modbus 服务器才能得到成功结果
    // 可以使用 pymodbus 启动测试服务器
    let dispatcher = OperationDispatcher::with_tokio_modbus(Arc::new(defaults));
    let target = CallTarget::slave(1);

    let result = dispatcher.read_register(0, &target, &TracingSink).await;
    println!("📖 {}", result);

    let result = dispatcher.write_register(0, 100, &target, &TracingSink).await;
    println!("✍️  {}", result);

    let result = dispatcher.read_coils(0, 8, &target, &TracingSink).await;
    println!("📖 {}", result);

    let result = dispatcher
        .read_input_registers(0, 4, &target.clone().with_transport("udp"), &TracingSink)
        .await;
    println!("📖 {}", result);

    if !result.is_success() {
        println!("\n💡 Tip: Start a Modbus server first:");
        println!("   pip install pymodbus");
        println!("   pymodbus.server --host 127.0.0.1 --port 502");
    }

    Ok(())
}
